//! Client configuration.

use std::time::Duration;

/// Default engine endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:2358";

/// Configuration for [`crate::Judge0Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Engine base URL, without a trailing slash.
    pub base_url: String,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Maximum number of status polls per job.
    pub max_attempts: u32,
    /// CPU time limit requested for each job.
    pub cpu_time_limit: Duration,
    /// Memory limit requested for each job, in kilobytes.
    pub memory_limit_kb: u64,
    /// Timeout for each individual HTTP request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(500),
            max_attempts: 30,
            cpu_time_limit: Duration::from_secs(5),
            memory_limit_kb: 128_000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `base_url`.
    #[must_use]
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self::default().base_url(base_url)
    }

    /// Override the base URL.
    #[must_use]
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the poll attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the CPU time limit.
    #[must_use]
    pub const fn cpu_time_limit(mut self, limit: Duration) -> Self {
        self.cpu_time_limit = limit;
        self
    }

    /// Override the memory limit.
    #[must_use]
    pub const fn memory_limit_kb(mut self, limit: u64) -> Self {
        self.memory_limit_kb = limit;
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Time spent sleeping on a job that never finishes: one interval
    /// after each of the `max_attempts` polls.
    #[must_use]
    pub fn poll_ceiling(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

//! Judge0 submit/poll client.

use std::sync::Arc;

use async_trait::async_trait;
use j0_core::{EngineError, ExecutionEngine, RunResult, Submission};
use serde::de::DeserializeOwned;

use super::protocol::{EngineLanguage, SubmissionRequest, SubmissionResponse, TokenResponse};
use crate::ClientConfig;

/// Stateless client for a Judge0-compatible engine.
///
/// Cheap to clone and safe to share across every session.
#[derive(Debug, Clone)]
pub struct Judge0Client {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl Judge0Client {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Submit a job and return its token.
    ///
    /// # Errors
    /// Returns `Submission` on a non-success response or when the engine
    /// cannot be reached (status 0).
    pub async fn submit(&self, submission: &Submission) -> Result<String, EngineError> {
        let body = SubmissionRequest::encode(submission, &self.config);
        let response = self
            .http
            .post(self.url("/submissions"))
            .query(&[("base64_encoded", "true"), ("wait", "false")])
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Submission {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        let TokenResponse { token } = decode(response).await?;
        tracing::debug!(%token, language_id = submission.language_id, "Submitted job");
        Ok(token)
    }

    /// Fetch the current state of a job once.
    ///
    /// # Errors
    /// Returns `Poll` on a non-success response, `Transport`/`Decode` on
    /// network or parse failures.
    pub async fn poll(&self, token: &str) -> Result<SubmissionResponse, EngineError> {
        let response = self
            .http
            .get(self.url(&format!("/submissions/{token}")))
            .query(&[("base64_encoded", "true")])
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Poll {
                status: status.as_u16(),
                body,
            });
        }

        decode(response).await
    }

    /// Poll until the job reaches a terminal status or the attempt budget
    /// runs out.
    ///
    /// # Errors
    /// Returns `Timeout` when no terminal status was seen within
    /// `max_attempts` polls, each followed by a `poll_interval` sleep. Any
    /// poll failure is returned immediately.
    pub async fn wait_for_result(&self, token: &str) -> Result<RunResult, EngineError> {
        let attempts = self.config.max_attempts;

        for attempt in 1..=attempts {
            let response = self.poll(token).await?;
            if response.status.is_terminal() {
                tracing::debug!(%token, attempt, status = response.status.id, "Job finished");
                return response.into_result(token);
            }

            tracing::debug!(%token, attempt, status = response.status.id, "Job pending");
            tokio::time::sleep(self.config.poll_interval).await;
        }

        tracing::warn!(
            %token,
            attempts,
            waited_ms = self.config.poll_ceiling().as_millis(),
            "Gave up waiting for job"
        );
        Err(EngineError::Timeout { attempts })
    }

    /// Engine instance information (`GET /about`).
    ///
    /// # Errors
    /// Returns error if the engine is unreachable or replies with garbage.
    pub async fn about(&self) -> Result<serde_json::Value, EngineError> {
        self.get_json("/about").await
    }

    /// Languages the engine supports (`GET /languages`).
    ///
    /// # Errors
    /// Returns error if the engine is unreachable or replies with garbage.
    pub async fn languages(&self) -> Result<Vec<EngineLanguage>, EngineError> {
        self.get_json("/languages").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EngineError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Request {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, EngineError> {
    response
        .json::<T>()
        .await
        .map_err(|e| EngineError::Decode(e.to_string()))
}

#[async_trait]
impl ExecutionEngine for Judge0Client {
    async fn execute(&self, submission: Submission) -> Result<RunResult, EngineError> {
        let token = self.submit(&submission).await?;
        self.wait_for_result(&token).await
    }
}

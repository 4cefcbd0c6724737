//! Language table for the remote execution engine.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Language a session is bound to.
///
/// Each language resolves to the numeric identifier the remote engine
/// expects in a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Bash,
    Python,
    Go,
    JavaScript,
    Ruby,
    Rust,
    C,
    Cpp,
}

/// Returned when a language name has no entry in the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl Language {
    /// Every supported language, in display order.
    pub const ALL: [Self; 8] = [
        Self::Bash,
        Self::Python,
        Self::Go,
        Self::JavaScript,
        Self::Ruby,
        Self::Rust,
        Self::C,
        Self::Cpp,
    ];

    /// Remote engine language identifier.
    #[must_use]
    pub const fn engine_id(self) -> u32 {
        match self {
            Self::Bash => 46,
            Self::Python => 71,
            Self::Go => 60,
            Self::JavaScript => 63,
            Self::Ruby => 72,
            Self::Rust => 73,
            Self::C => 50,
            Self::Cpp => 54,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Python => "python",
            Self::Go => "go",
            Self::JavaScript => "javascript",
            Self::Ruby => "ruby",
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
        }
    }

    /// Comma-separated list of canonical names, for help text and errors.
    #[must_use]
    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(|l| l.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let language = match s.trim().to_ascii_lowercase().as_str() {
            "bash" | "shell" | "sh" => Self::Bash,
            "python" | "python3" | "py" => Self::Python,
            "go" | "golang" => Self::Go,
            "javascript" | "js" | "node" => Self::JavaScript,
            "ruby" | "rb" => Self::Ruby,
            "rust" | "rs" => Self::Rust,
            "c" => Self::C,
            "cpp" | "c++" => Self::Cpp,
            _ => return Err(UnsupportedLanguage(s.to_string())),
        };
        Ok(language)
    }
}

//! Error types for redprobe

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("source '{name}': {message}")]
    Source { name: String, message: String },

    #[error("parse error in {file}{}: {reason}", position_suffix(.line, .column))]
    Parse {
        file: String,
        line: Option<usize>,
        column: Option<usize>,
        reason: String,
    },

    #[error("template '{id}' failed validation: {reason}")]
    Validation { id: String, reason: String },

    #[error("duplicate template id: {0}")]
    DuplicateId(String),

    #[error("template '{id}': variable resolution failed: {reason}")]
    VariableResolution { id: String, reason: String },

    #[error("template '{id}': {phase}-hook failed: {message}")]
    Hook {
        id: String,
        phase: String,
        message: String,
    },

    #[error("template '{id}': execution failed during {phase}: {message}")]
    Execution {
        id: String,
        phase: String,
        message: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    #[error("threshold exceeded: {0}")]
    ThresholdExceeded(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn position_suffix(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(l), Some(c)) => format!(":{}:{}", l, c),
        (Some(l), None) => format!(":{}", l),
        _ => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn validation(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn variable_resolution(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VariableResolution {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn hook(id: impl Into<String>, phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            id: id.into(),
            phase: phase.into(),
            message: message.into(),
        }
    }

    pub fn execution(
        id: impl Into<String>,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Execution {
            id: id.into(),
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Whether a retrying caller may reasonably try again.
    /// Cancellation and deadline errors are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Source { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_position() {
        let e = Error::Parse {
            file: "t.yaml".into(),
            line: Some(3),
            column: Some(7),
            reason: "bad indent".into(),
        };
        assert_eq!(e.to_string(), "parse error in t.yaml:3:7: bad indent");
    }

    #[test]
    fn execution_error_names_id_and_phase() {
        let e = Error::execution("probe_v1.0", "provider", "connection refused");
        let s = e.to_string();
        assert!(s.contains("probe_v1.0"));
        assert!(s.contains("provider"));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::source("local", "flaky").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::DuplicateId("x".into()).is_retryable());
    }
}

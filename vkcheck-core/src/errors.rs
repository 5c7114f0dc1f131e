//! Error taxonomy for validation runs.
//!
//! Check outcomes are control signals as much as diagnostics:
//! - [`CheckError::Recoverable`] restarts the round after a backoff pause.
//! - [`CheckError::Fatal`] aborts the run immediately.
//! - [`CheckError::Client`] is an unexpected transport/API failure; it bypasses
//!   the retry loop entirely.
//!
//! [`ValidationError`] is what the caller finally sees, always after cleanup.

use std::fmt;
use std::path::PathBuf;

/// Failures raised by the cluster client layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to cluster: {0}")]
    Connect(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("({reason}) {message}")]
    Api { reason: String, message: String },

    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Shorthand for an API error with a reason and message.
    pub fn api(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a single failed check evaluation.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Not true yet, may become true before the deadline.
    #[error("{0}")]
    Recoverable(String),

    /// Can never become true; the run is over.
    #[error("{title}")]
    Fatal { title: String, description: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl CheckError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::Recoverable(message.into())
    }

    pub fn fatal(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Fatal {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Whether waiting and evaluating again may clear this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

/// A cleanup action that could not be completed.
#[derive(Debug)]
pub struct CleanupFailure {
    /// Human-readable target, e.g. `pod demo/default`.
    pub target: String,
    pub error: ClientError,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

/// Terminal outcome of a validation run that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{}", render_fatal(title, description))]
    Fatal { title: String, description: String },

    /// Reports the configured timeout, not the measured elapsed time.
    #[error("Validation failed after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: f64 },

    #[error("Validation cancelled after {rounds} round(s)")]
    Cancelled { rounds: u32 },

    #[error("Cluster client error: {0}")]
    Client(#[from] ClientError),

    #[error("{}", render_cleanup(failures, original.as_deref()))]
    Cleanup {
        failures: Vec<CleanupFailure>,
        original: Option<Box<ValidationError>>,
    },
}

impl ValidationError {
    /// Stable process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal { .. } => 1,
            Self::Timeout { .. } => 2,
            Self::Client(_) => 3,
            Self::Cleanup { .. } => 4,
            Self::Cancelled { .. } => 130,
        }
    }

    /// The outcome the main loop produced, looking through cleanup failures.
    pub fn primary(&self) -> Option<&ValidationError> {
        match self {
            Self::Cleanup { original, .. } => original.as_deref(),
            other => Some(other),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.primary(), Some(Self::Timeout { .. }))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.primary(), Some(Self::Fatal { .. }))
    }
}

fn render_fatal(title: &str, description: &str) -> String {
    if description.trim().is_empty() {
        title.to_string()
    } else {
        format!("{title}\n\n{description}")
    }
}

fn render_cleanup(failures: &[CleanupFailure], original: Option<&ValidationError>) -> String {
    let mut out = format!("Cleanup failed for {} action(s)", failures.len());
    for failure in failures {
        out.push_str(&format!("\n  - {failure}"));
    }
    if let Some(original) = original {
        out.push_str(&format!("\nValidation outcome before cleanup: {original}"));
    }
    out
}

/// Errors raised while loading a scenario or harness configuration.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(String),

    #[error("Invalid harness config: {0}")]
    InvalidHarness(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_errors_name_their_source() {
        let yaml = serde_yaml_ng::from_str::<u32>("[").unwrap_err();
        let rendered = ScenarioError::from(yaml).to_string();
        assert!(rendered.starts_with("Failed to parse YAML: "));
        assert!(!rendered.contains("scenario"));
        assert_eq!(
            ScenarioError::InvalidHarness("timeout_multiplier must be positive".into()).to_string(),
            "Invalid harness config: timeout_multiplier must be positive"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CheckError::recoverable("not yet").is_retryable());
        assert!(!CheckError::fatal("boom", "").is_retryable());
        assert!(!CheckError::Client(ClientError::api("NotFound", "pod x")).is_retryable());
    }

    #[test]
    fn test_fatal_display_includes_description() {
        let err = ValidationError::Fatal {
            title: "Pod demo.default failed".to_string(),
            description: "phase: Failed".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("Pod demo.default failed"));
        assert!(rendered.contains("phase: Failed"));
    }

    #[test]
    fn test_fatal_display_without_description() {
        let err = ValidationError::Fatal {
            title: "too many matches".to_string(),
            description: "  ".to_string(),
        };
        assert_eq!(err.to_string(), "too many matches");
    }

    #[test]
    fn test_timeout_reports_configured_value() {
        let err = ValidationError::Timeout {
            timeout_seconds: 2.5,
        };
        assert_eq!(err.to_string(), "Validation failed after 2.5 seconds");
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ValidationError::Fatal {
                title: String::new(),
                description: String::new(),
            }
            .exit_code(),
            ValidationError::Timeout {
                timeout_seconds: 1.0,
            }
            .exit_code(),
            ValidationError::Client(ClientError::Connect("x".into())).exit_code(),
            ValidationError::Cleanup {
                failures: Vec::new(),
                original: None,
            }
            .exit_code(),
            ValidationError::Cancelled { rounds: 0 }.exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_cleanup_error_keeps_original_outcome() {
        let err = ValidationError::Cleanup {
            failures: vec![CleanupFailure {
                target: "pod demo/default".to_string(),
                error: ClientError::api("Forbidden", "cannot delete"),
            }],
            original: Some(Box::new(ValidationError::Timeout {
                timeout_seconds: 60.0,
            })),
        };
        assert!(err.is_timeout());
        assert!(!err.is_fatal());
        let rendered = err.to_string();
        assert!(rendered.contains("pod demo/default"));
        assert!(rendered.contains("(Forbidden) cannot delete"));
        assert!(rendered.contains("Validation failed after 60 seconds"));
    }

    #[test]
    fn test_cleanup_error_without_original_has_no_primary() {
        let err = ValidationError::Cleanup {
            failures: Vec::new(),
            original: None,
        };
        assert!(err.primary().is_none());
    }
}

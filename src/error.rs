//! # Engine Errors
//!
//! Error taxonomy shared by every engine component. Configuration and
//! terminated-engine errors are returned synchronously to the caller that
//! triggered them; handler failures are reported to the observer and logged,
//! never re-raised into the engine itself.

use crate::config::ConfigurationError;
use thiserror::Error;
use uuid::Uuid;

/// Comprehensive error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine has terminated; no further events or transitions are accepted")]
    Terminated,

    #[error("A handler is already registered for event variant {variant}")]
    DuplicateHandler { variant: String },

    #[error("No handler registered for event variant {variant}")]
    NoHandler { variant: String },

    #[error("Handler for event variant {variant} failed: {message}")]
    HandlerFailed { variant: String, message: String },

    #[error("Event {variant} rejected before dispatch: {message}")]
    EventRejected { variant: String, message: String },

    #[error("Observed source failed in actioner {actioner}: {message}")]
    SourceFailed { actioner: Uuid, message: String },

    #[error("Actioner {actioner} completed with {remaining} open subscription(s)")]
    CompletionOrdering { actioner: Uuid, remaining: usize },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl EngineError {
    /// Build a handler failure from the variant that triggered it
    pub fn handler_failed(variant: impl std::fmt::Debug, error: &anyhow::Error) -> Self {
        Self::HandlerFailed {
            variant: format!("{variant:?}"),
            message: format!("{error:#}"),
        }
    }

    /// Whether the error signals a misconfigured engine rather than a runtime failure
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateHandler { .. } | Self::NoHandler { .. } | Self::Configuration(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failure_renders_error_chain() {
        let source = anyhow::anyhow!("disk full").context("writing snapshot");
        let err = EngineError::handler_failed("Persist", &source);

        match &err {
            EngineError::HandlerFailed { variant, message } => {
                assert_eq!(variant, "\"Persist\"");
                assert_eq!(message, "writing snapshot: disk full");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn configuration_errors_are_classified() {
        let duplicate = EngineError::DuplicateHandler {
            variant: "Increment".to_string(),
        };
        let missing = EngineError::NoHandler {
            variant: "Reset".to_string(),
        };

        assert!(duplicate.is_configuration_error());
        assert!(missing.is_configuration_error());
        assert!(!EngineError::Terminated.is_configuration_error());
        assert_eq!(
            missing.to_string(),
            "No handler registered for event variant Reset"
        );
    }
}

//! Error types for spamcheck.

use crate::pipeline::types::MsgId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the external collaborators (resolver, enumerator, classifier).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Service {service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Batch of {size} users exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

/// Errors observed while a pipeline runs.
///
/// Collaborator failures are non-fatal: the stage that hit them logs, degrades,
/// and hands them back to the orchestrator for the final report.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Listing messages for a batch of {batch_size} users failed: {source}")]
    Enumerate {
        batch_size: usize,
        #[source]
        source: ServiceError,
    },

    #[error("Spam check for message {id} failed: {source}")]
    Classify {
        id: MsgId,
        #[source]
        source: ServiceError,
    },

    #[error("Stage {stage} panicked: {reason}")]
    StagePanicked { stage: String, reason: String },

    #[error("Pipeline has no stages")]
    EmptyPipeline,
}

/// Result type alias for spamcheck.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_error_wraps_service_error() {
        let err = PipelineError::Enumerate {
            batch_size: 2,
            source: ServiceError::RequestFailed {
                service: "mailbox".into(),
                reason: "timeout".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("2 users"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn pipeline_error_converts_to_top_level() {
        let err: Error = PipelineError::EmptyPipeline.into();
        assert!(matches!(err, Error::Pipeline(PipelineError::EmptyPipeline)));
        assert_eq!(err.to_string(), "Pipeline error: Pipeline has no stages");
    }
}

use thiserror::Error;

use crate::pipeline::PipelineTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    PipelineTransition(#[from] PipelineTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0}")]
    Pipeline(String),
    #[error("configuration issue: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable label used in structured command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "pipeline_invariant",
            Self::Pipeline(_) => "pipeline",
            Self::Configuration(_) => "config_validation",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Domain(_) | Self::Pipeline(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError};
    use crate::pipeline::{PipelineEvent, PipelineState, PipelineTransitionError};

    #[test]
    fn transition_error_maps_to_pipeline_failure() {
        let error = ApplicationError::from(DomainError::from(
            PipelineTransitionError::InvalidTransition {
                state: PipelineState::Completed,
                event: PipelineEvent::ReportProduced,
            },
        ));

        assert_eq!(error.error_class(), "pipeline_invariant");
        assert_eq!(error.exit_code(), 5);
        assert!(error.to_string().contains("Completed"));
    }

    #[test]
    fn aborted_run_keeps_its_message() {
        let error = ApplicationError::Pipeline(
            "pipeline aborted during analyze stage: provider returned 503".to_owned(),
        );

        assert_eq!(error.error_class(), "pipeline");
        assert_eq!(error.exit_code(), 5);
        assert_eq!(error.to_string(), "pipeline aborted during analyze stage: provider returned 503");
    }

    #[test]
    fn configuration_error_exits_with_two() {
        let error = ApplicationError::Configuration("OPENAI_API_KEY is required".to_owned());

        assert_eq!(error.error_class(), "config_validation");
        assert_eq!(error.exit_code(), 2);
        assert_eq!(error.to_string(), "configuration issue: OPENAI_API_KEY is required");
    }
}

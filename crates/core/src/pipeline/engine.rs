use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::pipeline::states::{PipelineContext, PipelineEvent, PipelineState, TransitionOutcome};

/// Fixed ANALYZE -> STRATEGIZE -> EXECUTE sequence. There is no branching:
/// each stage either hands over to the next one or aborts the run.
#[derive(Clone, Debug, Default)]
pub struct PipelineEngine;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineTransitionError {
    #[error("cannot leave {state:?}: stage artifact `{artifact}` was not recorded")]
    MissingArtifact { state: PipelineState, artifact: &'static str },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PipelineState, event: PipelineEvent },
}

impl PipelineEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> PipelineState {
        PipelineState::Analyze
    }

    pub fn apply(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError> {
        transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &PipelineState,
        event: &PipelineEvent,
        context: &PipelineContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, PipelineTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                let event = AuditEvent::new(
                    audit.run_id,
                    audit.correlation_id.clone(),
                    "pipeline.transition_applied",
                    AuditCategory::Pipeline,
                    audit.actor.clone(),
                    if outcome.to == PipelineState::Aborted {
                        AuditOutcome::Failed
                    } else {
                        AuditOutcome::Success
                    },
                )
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to))
                .with_metadata("event", format!("{:?}", outcome.event));
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.run_id,
                        audit.correlation_id.clone(),
                        "pipeline.transition_rejected",
                        AuditCategory::Pipeline,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn transition(
    current: &PipelineState,
    event: &PipelineEvent,
    context: &PipelineContext,
) -> Result<TransitionOutcome, PipelineTransitionError> {
    use PipelineEvent::{DecisionsRecorded, ExecutionFinished, ReportProduced, StageFailed};
    use PipelineState::{Aborted, Analyze, Completed, Execute, Strategize};

    let require = |present: bool, artifact: &'static str| {
        if present {
            Ok(())
        } else {
            Err(PipelineTransitionError::MissingArtifact { state: *current, artifact })
        }
    };

    let to = match (current, event) {
        (Analyze, ReportProduced) => {
            require(context.report.is_some(), "analyst_report")?;
            Strategize
        }
        (Strategize, DecisionsRecorded) => {
            require(context.decisions.is_some(), "strategist_decisions")?;
            Execute
        }
        (Execute, ExecutionFinished) => {
            require(context.result.is_some(), "execution_result")?;
            Completed
        }
        (Analyze | Strategize | Execute, StageFailed) => Aborted,
        _ => {
            return Err(PipelineTransitionError::InvalidTransition {
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event })
}

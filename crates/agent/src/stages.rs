//! The three pipeline stages. Each one reads what earlier stages left in the
//! [`PipelineContext`], calls the model and its tools, and hands back a
//! [`StageOutput`] for the runner to record.

pub mod analyst;
pub mod execution;
pub mod strategist;

use thiserror::Error;

use stockpilot_core::audit::{AuditContext, AuditSink};
use stockpilot_core::config::PipelineConfig;
use stockpilot_core::domain::decision::StrategistDecision;
use stockpilot_core::domain::execution::ExecutionResult;
use stockpilot_core::domain::report::AnalystReport;
use stockpilot_core::pipeline::{PipelineContext, PipelineEvent, StageKind};

use crate::guardrails::GuardrailPolicy;
use crate::llm::LlmClient;
use crate::tools::{CompetitorPricesTool, ErpDatabaseTool, SupplierEmailTool};

/// Everything a stage may call out to. Stages only touch the tools their
/// role needs.
pub struct StageCapabilities<'a> {
    pub llm: &'a dyn LlmClient,
    pub erp: &'a ErpDatabaseTool,
    pub prices: &'a CompetitorPricesTool,
    pub email: &'a SupplierEmailTool,
    pub pipeline: &'a PipelineConfig,
    pub guardrails: &'a GuardrailPolicy,
    pub audit: &'a dyn AuditSink,
    pub audit_context: &'a AuditContext,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{stage} stage: model call failed: {message}")]
    Llm { stage: StageKind, message: String },
    #[error("{stage} stage: model output could not be parsed: {reason}")]
    MalformedOutput { stage: StageKind, reason: String },
    #[error("{stage} stage: `{artifact}` from an earlier stage is missing")]
    MissingContext { stage: StageKind, artifact: &'static str },
}

impl StageError {
    pub fn llm(stage: StageKind, error: &anyhow::Error) -> Self {
        Self::Llm { stage, message: format!("{error:#}") }
    }

    pub fn stage(&self) -> StageKind {
        match self {
            Self::Llm { stage, .. }
            | Self::MalformedOutput { stage, .. }
            | Self::MissingContext { stage, .. } => *stage,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageOutput {
    Report { report: AnalystReport, transcript: String },
    Decisions { decisions: Vec<StrategistDecision>, transcript: String },
    Execution { result: ExecutionResult, transcript: String },
}

impl StageOutput {
    /// Stores the artifact and transcript on the context and returns the
    /// event that moves the pipeline on.
    pub fn record(self, context: &mut PipelineContext) -> PipelineEvent {
        match self {
            Self::Report { report, transcript } => {
                context.report = Some(report);
                context.record_transcript(StageKind::Analyze, transcript);
                PipelineEvent::ReportProduced
            }
            Self::Decisions { decisions, transcript } => {
                context.decisions = Some(decisions);
                context.record_transcript(StageKind::Strategize, transcript);
                PipelineEvent::DecisionsRecorded
            }
            Self::Execution { result, transcript } => {
                context.result = Some(result);
                context.record_transcript(StageKind::Execute, transcript);
                PipelineEvent::ExecutionFinished
            }
        }
    }
}

pub async fn run_stage(
    stage: StageKind,
    context: &PipelineContext,
    capabilities: &StageCapabilities<'_>,
) -> Result<StageOutput, StageError> {
    match stage {
        StageKind::Analyze => analyst::run(context, capabilities).await,
        StageKind::Strategize => strategist::run(context, capabilities).await,
        StageKind::Execute => execution::run(context, capabilities).await,
    }
}

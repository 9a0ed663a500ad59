use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use stockpilot_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use stockpilot_core::config::{AppConfig, PipelineConfig};
use stockpilot_core::errors::{ApplicationError, DomainError};
use stockpilot_core::market::SimulatedCompetitorPrices;
use stockpilot_core::pipeline::{
    PipelineContext, PipelineEngine, PipelineEvent, PipelineState, PipelineTransitionError,
    StageKind,
};
use stockpilot_db::ErpStore;

use crate::guardrails::GuardrailPolicy;
use crate::llm::LlmClient;
use crate::stages::{run_stage, StageCapabilities, StageError};
use crate::tools::{CompetitorPricesTool, ErpDatabaseTool, SupplierEmailTool};

const ACTOR: &str = "stockpilot.pipeline";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline aborted during {stage} stage: {source}")]
    Aborted { stage: StageKind, source: StageError, context: Box<PipelineContext> },
    #[error(transparent)]
    Transition(#[from] PipelineTransitionError),
}

impl PipelineError {
    /// Whatever the run had produced before it stopped.
    pub fn context(&self) -> Option<&PipelineContext> {
        match self {
            Self::Aborted { context, .. } => Some(&**context),
            Self::Transition(_) => None,
        }
    }
}

impl From<PipelineError> for ApplicationError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Transition(error) => Self::Domain(DomainError::from(error)),
            aborted @ PipelineError::Aborted { .. } => Self::Pipeline(aborted.to_string()),
        }
    }
}

/// Drives one pipeline run: stages in fixed order, each transition checked
/// by the engine and written to the audit sink.
pub struct PipelineRunner {
    llm: Arc<dyn LlmClient>,
    erp: ErpDatabaseTool,
    prices: CompetitorPricesTool,
    email: SupplierEmailTool,
    pipeline: PipelineConfig,
    guardrails: GuardrailPolicy,
    engine: PipelineEngine,
    audit: Arc<dyn AuditSink>,
}

impl PipelineRunner {
    pub fn new(llm: Arc<dyn LlmClient>, store: ErpStore, config: &AppConfig) -> Self {
        Self {
            llm,
            erp: ErpDatabaseTool::new(store),
            prices: CompetitorPricesTool::new(
                Arc::new(SimulatedCompetitorPrices),
                config.pipeline.competitor_count,
            ),
            email: SupplierEmailTool::new(config.smtp.clone()),
            pipeline: config.pipeline.clone(),
            guardrails: GuardrailPolicy::from_config(&config.pipeline),
            engine: PipelineEngine::new(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn run(&self) -> Result<PipelineContext, PipelineError> {
        self.run_with_id(Uuid::new_v4()).await
    }

    pub async fn run_with_id(&self, run_id: Uuid) -> Result<PipelineContext, PipelineError> {
        let audit = AuditContext::new(run_id, run_id.to_string(), ACTOR);
        let mut context = PipelineContext::new(run_id);
        let mut state = self.engine.initial_state();
        context.state = state;
        tracing::info!(event_name = "pipeline.started", run_id = %run_id, "pipeline run started");

        while let Some(stage) = state.stage() {
            let started = Instant::now();
            let stage_audit = audit.for_actor(format!("{ACTOR}.{}", stage.as_str()));
            let capabilities = StageCapabilities {
                llm: self.llm.as_ref(),
                erp: &self.erp,
                prices: &self.prices,
                email: &self.email,
                pipeline: &self.pipeline,
                guardrails: &self.guardrails,
                audit: self.audit.as_ref(),
                audit_context: &stage_audit,
            };
            tracing::info!(
                event_name = "pipeline.stage.started",
                run_id = %run_id,
                stage = stage.as_str(),
                "stage started"
            );

            match run_stage(stage, &context, &capabilities).await {
                Ok(output) => {
                    let event = output.record(&mut context);
                    state = self.transition(state, event, &mut context, &audit)?;
                    tracing::info!(
                        event_name = "pipeline.stage.finished",
                        run_id = %run_id,
                        stage = stage.as_str(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "stage finished"
                    );
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "pipeline.stage.failed",
                        run_id = %run_id,
                        stage = stage.as_str(),
                        error = %error,
                        "stage failed; aborting run"
                    );
                    context.failure = Some(error.to_string());
                    self.transition(state, PipelineEvent::StageFailed, &mut context, &audit)?;
                    return Err(PipelineError::Aborted {
                        stage,
                        source: error,
                        context: Box::new(context),
                    });
                }
            }
        }

        tracing::info!(
            event_name = "pipeline.completed",
            run_id = %run_id,
            state = ?state,
            "pipeline run completed"
        );
        Ok(context)
    }

    fn transition(
        &self,
        state: PipelineState,
        event: PipelineEvent,
        context: &mut PipelineContext,
        audit: &AuditContext,
    ) -> Result<PipelineState, PipelineTransitionError> {
        let outcome =
            self.engine.apply_with_audit(&state, &event, context, self.audit.as_ref(), audit)?;
        context.state = outcome.to;
        Ok(outcome.to)
    }
}

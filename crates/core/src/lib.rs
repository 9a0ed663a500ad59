pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod market;
pub mod pipeline;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use domain::decision::{reconcile_decisions, ActionType, ProposedDecision, StrategistDecision};
pub use domain::execution::{ExecutionResult, PriceChange};
pub use domain::product::{ProductId, ProductSnapshot};
pub use domain::report::{AnalystReport, Finding, FindingKind, LowStockItem, PriceFinding};
pub use errors::{ApplicationError, DomainError};
pub use market::{CompetitorPriceSource, CompetitorPrices, SimulatedCompetitorPrices};
pub use pipeline::{
    PipelineContext, PipelineEngine, PipelineEvent, PipelineState, PipelineTransitionError,
    StageKind,
};

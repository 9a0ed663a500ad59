//! Agent runtime for the stockpilot pipeline.
//!
//! Three LLM-backed stages run in a fixed order:
//! 1. **Analyze** (`stages::analyst`) - read the ERP, compare competitor
//!    prices, and produce an `AnalystReport`.
//! 2. **Strategize** (`stages::strategist`) - pick one action per finding.
//! 3. **Execute** (`stages::execution`) - send supplier reorder emails and
//!    apply price updates, each checked by `guardrails` first.
//!
//! The model only writes prose and drafts. Findings are computed from the
//! data, decisions are reconciled against those findings, and every write
//! goes through a tool.

pub mod extract;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod stages;
pub mod tools;

pub use llm::{CompletionRequest, HttpLlmClient, LlmClient};
pub use runtime::{PipelineError, PipelineRunner};
pub use tools::{Tool, ToolError, ToolRegistry};

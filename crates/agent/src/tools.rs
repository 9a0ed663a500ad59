pub mod competitor_prices;
pub mod erp_database;
pub mod supplier_email;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use stockpilot_core::config::AppConfig;
use stockpilot_core::market::SimulatedCompetitorPrices;
use stockpilot_db::ErpStore;
use thiserror::Error;

pub use competitor_prices::{CompetitorPricesTool, PriceLookup};
pub use erp_database::{ErpDatabaseTool, ErpOutcome, ErpRequest};
pub use supplier_email::{EmailMessage, EmailOutcome, SupplierEmailTool};

/// Rejections at the tool boundary. Store and transport failures are not
/// errors; tools report those inside their JSON result.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid input for `{tool}`: {reason}")]
    InvalidInput { tool: &'static str, reason: String },
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("could not encode `{tool}` result: {reason}")]
    Encoding { tool: &'static str, reason: String },
}

impl ToolError {
    pub fn invalid(tool: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput { tool, reason: reason.into() }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

/// Turns a string input that carries a JSON document into that document.
/// Anything else passes through unchanged.
pub(crate) fn decode_json_input(tool: &'static str, input: Value) -> Result<Value, ToolError> {
    match input {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|error| ToolError::invalid(tool, format!("input is not valid JSON: {error}"))),
        other => Ok(other),
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tracing::debug!(event_name = "tool.invoked", tool = name, "invoking tool");
        tool.execute(input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The three pipeline tools wired from configuration, with the simulated
/// competitor price book.
pub fn standard_registry(store: ErpStore, config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(ErpDatabaseTool::new(store));
    registry.register(CompetitorPricesTool::new(
        Arc::new(SimulatedCompetitorPrices),
        config.pipeline.competitor_count,
    ));
    registry.register(SupplierEmailTool::new(config.smtp.clone()));
    registry
}

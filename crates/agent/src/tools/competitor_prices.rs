use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use stockpilot_core::market::{CompetitorPriceSource, CompetitorPrices, MAX_COMPETITOR_COUNT};

use super::{Tool, ToolError};

pub const NAME: &str = "competitor_prices";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceLookup {
    pub product_identifier: String,
    pub competitor_count: Option<usize>,
}

impl PriceLookup {
    pub fn new(product_identifier: impl Into<String>) -> Self {
        Self { product_identifier: product_identifier.into(), competitor_count: None }
    }

    /// A bare identifier string, or `{"product_identifier", "competitor_count"?}`
    /// (optionally JSON-encoded inside a string).
    pub fn from_value(input: Value) -> Result<Self, ToolError> {
        let input = match input {
            Value::String(text) if text.trim_start().starts_with('{') => {
                serde_json::from_str(&text).map_err(|error| {
                    ToolError::invalid(NAME, format!("input is not valid JSON: {error}"))
                })?
            }
            Value::String(text) => return Self::identifier(text).map(Self::new),
            other => other,
        };

        let Value::Object(fields) = input else {
            return Err(ToolError::invalid(NAME, "expected an identifier or a JSON object"));
        };
        let identifier = match fields.get("product_identifier") {
            Some(Value::String(text)) => Self::identifier(text.clone())?,
            Some(_) => return Err(ToolError::invalid(NAME, "`product_identifier` must be a string")),
            None => return Err(ToolError::invalid(NAME, "missing `product_identifier`")),
        };
        let competitor_count = match fields.get("competitor_count") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let count = value.as_i64().ok_or_else(|| {
                    ToolError::invalid(NAME, "`competitor_count` must be an integer")
                })?;
                Some(count.clamp(1, MAX_COMPETITOR_COUNT as i64) as usize)
            }
        };

        Ok(Self { product_identifier: identifier, competitor_count })
    }

    fn identifier(text: String) -> Result<String, ToolError> {
        if text.trim().is_empty() {
            return Err(ToolError::invalid(NAME, "product identifier is empty"));
        }
        Ok(text)
    }
}

#[derive(Clone)]
pub struct CompetitorPricesTool {
    source: Arc<dyn CompetitorPriceSource>,
    default_count: usize,
}

impl CompetitorPricesTool {
    pub fn new(source: Arc<dyn CompetitorPriceSource>, default_count: usize) -> Self {
        Self { source, default_count }
    }

    pub fn lookup(&self, request: &PriceLookup) -> CompetitorPrices {
        let count = request.competitor_count.unwrap_or(self.default_count);
        let prices = self.source.lookup(&request.product_identifier, count);
        tracing::debug!(
            event_name = "tool.competitor_prices.lookup",
            product = %request.product_identifier,
            count = prices.competitor_prices.len(),
            min_price = %prices.min_price,
            "competitor prices resolved"
        );
        prices
    }
}

#[async_trait]
impl Tool for CompetitorPricesTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Look up competitor prices for a product. Input: a product SKU or \
         {\"product_identifier\": \"...\", \"competitor_count\": 3}."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let request = PriceLookup::from_value(input)?;
        serde_json::to_value(self.lookup(&request))
            .map_err(|error| ToolError::Encoding { tool: NAME, reason: error.to_string() })
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub sku: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub old_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_price: Decimal,
}

/// Final artifact of a pipeline run, accumulated while actions execute.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub emails_sent: Vec<String>,
    pub prices_updated: Vec<PriceChange>,
    pub errors: Vec<String>,
}

impl ExecutionResult {
    pub fn record_email(&mut self, recipient: impl Into<String>) {
        self.emails_sent.push(recipient.into());
    }

    pub fn record_price_change(&mut self, change: PriceChange) {
        self.prices_updated.push(change);
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

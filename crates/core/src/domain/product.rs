use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

/// One `products` row as read through the data-access tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
}

impl ProductSnapshot {
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, DomainError> {
        Ok(Self {
            id: ProductId(int_column(row, "id")?),
            sku: text_column(row, "sku")?,
            name: text_column(row, "name")?,
            price: money_column(row, "price")?,
            stock_quantity: int_column(row, "stock_quantity")?,
            min_stock_level: int_column(row, "min_stock_level")?,
        })
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity < self.min_stock_level
    }
}

pub fn int_column(row: &Map<String, Value>, column: &str) -> Result<i64, DomainError> {
    row.get(column).and_then(Value::as_i64).ok_or_else(|| missing(column, "an integer"))
}

pub fn text_column(row: &Map<String, Value>, column: &str) -> Result<String, DomainError> {
    row.get(column)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(column, "text"))
}

/// Prices are stored as REAL; they are brought back to cents here.
pub fn money_column(row: &Map<String, Value>, column: &str) -> Result<Decimal, DomainError> {
    row.get(column)
        .and_then(Value::as_f64)
        .and_then(Decimal::from_f64)
        .map(|value| value.round_dp(2))
        .ok_or_else(|| missing(column, "a number"))
}

fn missing(column: &str, expected: &str) -> DomainError {
    DomainError::InvariantViolation(format!("column `{column}` is missing or is not {expected}"))
}

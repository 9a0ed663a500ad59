use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub min_stock_level: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFinding {
    pub product_id: ProductId,
    pub sku: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub our_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub competitor_min: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub competitor_avg: Option<Decimal>,
}

/// Output of the analysis stage. Lives for one pipeline run only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystReport {
    pub low_stock_items: Vec<LowStockItem>,
    pub uncompetitive_prices: Vec<PriceFinding>,
    pub summary: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    LowStock,
    Price,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowStock => "low_stock",
            Self::Price => "price",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    LowStock(LowStockItem),
    Price(PriceFinding),
}

impl Finding {
    pub fn kind(&self) -> FindingKind {
        match self {
            Self::LowStock(_) => FindingKind::LowStock,
            Self::Price(_) => FindingKind::Price,
        }
    }

    pub fn sku(&self) -> &str {
        match self {
            Self::LowStock(item) => &item.sku,
            Self::Price(finding) => &finding.sku,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            Self::LowStock(item) => item.product_id,
            Self::Price(finding) => finding.product_id,
        }
    }

    /// `low_stock:<sku>` or `price:<sku>`; a SKU can carry both kinds.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.kind().as_str(), self.sku())
    }
}

impl AnalystReport {
    /// Findings in the order they were raised: stock first, then price.
    pub fn findings(&self) -> Vec<Finding> {
        self.low_stock_items
            .iter()
            .cloned()
            .map(Finding::LowStock)
            .chain(self.uncompetitive_prices.iter().cloned().map(Finding::Price))
            .collect()
    }

    pub fn finding_by_reference(&self, reference: &str) -> Option<Finding> {
        self.findings().into_iter().find(|finding| finding.reference() == reference)
    }

    pub fn is_empty(&self) -> bool {
        self.low_stock_items.is_empty() && self.uncompetitive_prices.is_empty()
    }
}

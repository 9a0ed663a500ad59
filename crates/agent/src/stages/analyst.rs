use rust_decimal::Decimal;
use serde::Serialize;

use stockpilot_core::domain::product::ProductSnapshot;
use stockpilot_core::domain::report::{AnalystReport, LowStockItem, PriceFinding};
use stockpilot_core::market::CompetitorPrices;
use stockpilot_core::pipeline::{PipelineContext, StageKind};

use super::{StageCapabilities, StageError, StageOutput};
use crate::llm::CompletionRequest;
use crate::prompts::ANALYST;
use crate::tools::{CompetitorPricesTool, ErpOutcome, ErpRequest, PriceLookup};

pub const PRODUCTS_QUERY: &str =
    "SELECT id, sku, name, price, stock_quantity, min_stock_level FROM products ORDER BY id";

#[derive(Clone, Debug, Serialize)]
pub struct PriceComparison {
    pub sku: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub our_price: Decimal,
    pub competitors: CompetitorPrices,
}

/// Products the analyst could read, plus anything that went wrong reading them.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    pub products: Vec<ProductSnapshot>,
    pub problems: Vec<String>,
}

pub async fn load_inventory(capabilities: &StageCapabilities<'_>) -> Inventory {
    let mut inventory = Inventory::default();
    match capabilities.erp.run(&ErpRequest::read(PRODUCTS_QUERY)).await {
        ErpOutcome::Rows(rows) => {
            for row in &rows {
                match ProductSnapshot::from_row(row) {
                    Ok(product) => inventory.products.push(product),
                    Err(error) => {
                        tracing::warn!(
                            event_name = "stage.analyze.row_skipped",
                            error = %error,
                            "product row could not be decoded"
                        );
                        inventory.problems.push(format!("Skipped product row: {error}"));
                    }
                }
            }
        }
        ErpOutcome::Error(message) => inventory.problems.push(message),
        ErpOutcome::RowCount(_) => {}
    }
    inventory
}

/// Deterministic findings: stock below minimum, and our price above the
/// cheapest competitor by more than `tolerance_pct` percent.
pub fn build_report(
    products: &[ProductSnapshot],
    prices: &CompetitorPricesTool,
    competitor_count: usize,
    tolerance_pct: u32,
) -> (AnalystReport, Vec<PriceComparison>) {
    let markup = Decimal::ONE + Decimal::from(tolerance_pct) / Decimal::ONE_HUNDRED;
    let mut report = AnalystReport::default();
    let mut comparisons = Vec::with_capacity(products.len());

    for product in products {
        if product.is_low_stock() {
            report.low_stock_items.push(LowStockItem {
                product_id: product.id,
                sku: product.sku.clone(),
                name: product.name.clone(),
                current_stock: product.stock_quantity,
                min_stock_level: product.min_stock_level,
            });
        }

        let competitors = prices.lookup(&PriceLookup {
            product_identifier: product.sku.clone(),
            competitor_count: Some(competitor_count),
        });
        if product.price > competitors.min_price * markup {
            report.uncompetitive_prices.push(PriceFinding {
                product_id: product.id,
                sku: product.sku.clone(),
                our_price: product.price,
                competitor_min: competitors.min_price,
                competitor_avg: competitors.average(),
            });
        }
        comparisons.push(PriceComparison {
            sku: product.sku.clone(),
            our_price: product.price,
            competitors,
        });
    }

    (report, comparisons)
}

pub async fn run(
    context: &PipelineContext,
    capabilities: &StageCapabilities<'_>,
) -> Result<StageOutput, StageError> {
    let inventory = load_inventory(capabilities).await;
    let (mut report, comparisons) = build_report(
        &inventory.products,
        capabilities.prices,
        capabilities.pipeline.competitor_count,
        capabilities.pipeline.price_tolerance_pct,
    );
    tracing::info!(
        event_name = "stage.analyze.findings",
        run_id = %context.run_id,
        products = inventory.products.len(),
        low_stock = report.low_stock_items.len(),
        uncompetitive = report.uncompetitive_prices.len(),
        "inventory analysed"
    );

    let inventory_json = serde_json::to_string_pretty(&inventory.products).unwrap_or_default();
    let comparisons_json = serde_json::to_string_pretty(&comparisons).unwrap_or_default();
    let findings_json = serde_json::to_string_pretty(&report).unwrap_or_default();
    let problems = inventory.problems.join("\n");
    let user = ANALYST.user(&[
        ("ERP inventory", inventory_json.as_str()),
        ("Data access problems", problems.as_str()),
        ("Competitor price comparison", comparisons_json.as_str()),
        ("Computed findings", findings_json.as_str()),
    ]);

    let completion = capabilities
        .llm
        .complete(&CompletionRequest::new(ANALYST.system(), user))
        .await
        .map_err(|error| StageError::llm(StageKind::Analyze, &error))?;

    report.summary = completion.trim().to_string();
    Ok(StageOutput::Report { report, transcript: completion })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use stockpilot_core::domain::product::{ProductId, ProductSnapshot};
    use stockpilot_core::market::SimulatedCompetitorPrices;

    use super::build_report;
    use crate::tools::CompetitorPricesTool;

    fn product(id: i64, sku: &str, price_cents: i64, stock: i64, min: i64) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId(id),
            sku: sku.to_string(),
            name: sku.replace('_', " "),
            price: Decimal::new(price_cents, 2),
            stock_quantity: stock,
            min_stock_level: min,
        }
    }

    fn demo_catalog() -> Vec<ProductSnapshot> {
        vec![
            product(1, "widget_a", 3299, 5, 15),
            product(2, "widget_b", 4650, 50, 20),
            product(3, "gadget_x", 9800, 3, 10),
            product(4, "gadget_y", 1550, 25, 15),
        ]
    }

    #[test]
    fn demo_catalog_yields_expected_findings() {
        let prices = CompetitorPricesTool::new(Arc::new(SimulatedCompetitorPrices), 3);

        let (report, comparisons) = build_report(&demo_catalog(), &prices, 3, 5);

        let low: Vec<&str> = report.low_stock_items.iter().map(|item| item.sku.as_str()).collect();
        let pricey: Vec<&str> =
            report.uncompetitive_prices.iter().map(|finding| finding.sku.as_str()).collect();
        assert_eq!(low, vec!["widget_a", "gadget_x"]);
        assert_eq!(pricey, vec!["widget_a", "gadget_y"]);
        assert_eq!(report.uncompetitive_prices[0].competitor_min, Decimal::new(2700, 2));
        assert_eq!(report.uncompetitive_prices[0].competitor_avg, Some(Decimal::new(2950, 2)));
        assert_eq!(comparisons.len(), 4);
    }

    #[test]
    fn wider_tolerance_suppresses_price_findings() {
        let prices = CompetitorPricesTool::new(Arc::new(SimulatedCompetitorPrices), 3);

        let (report, _) = build_report(&demo_catalog(), &prices, 3, 25);

        assert!(report.uncompetitive_prices.is_empty());
        assert_eq!(report.low_stock_items.len(), 2);
    }
}

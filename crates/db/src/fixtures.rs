use serde::Serialize;
use serde_json::{json, Value};

use crate::store::{ErpStore, StoreError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemoProduct {
    pub sku: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
}

/// Sample catalog loaded into an empty ERP. Two of the four start below
/// their minimum stock level.
pub const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        sku: "widget_a",
        name: "Widget A",
        price: 32.99,
        stock_quantity: 5,
        min_stock_level: 15,
    },
    DemoProduct {
        sku: "widget_b",
        name: "Widget B",
        price: 46.50,
        stock_quantity: 50,
        min_stock_level: 20,
    },
    DemoProduct {
        sku: "gadget_x",
        name: "Gadget X",
        price: 98.00,
        stock_quantity: 3,
        min_stock_level: 10,
    },
    DemoProduct {
        sku: "gadget_y",
        name: "Gadget Y",
        price: 15.50,
        stock_quantity: 25,
        min_stock_level: 15,
    },
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub existing_products: i64,
    pub inserted: Vec<String>,
}

impl SeedReport {
    pub fn skipped(&self) -> bool {
        self.inserted.is_empty()
    }
}

pub async fn product_count(store: &ErpStore) -> Result<i64, StoreError> {
    let rows = store.query_rows("SELECT COUNT(*) AS count FROM products", &[]).await?;
    Ok(rows.first().and_then(|row| row.get("count")).and_then(Value::as_i64).unwrap_or(0))
}

/// Inserts [`DEMO_PRODUCTS`] when the products table is empty. A populated
/// table is left untouched.
pub async fn seed_if_empty(store: &ErpStore) -> Result<SeedReport, StoreError> {
    let existing_products = product_count(store).await?;
    if existing_products > 0 {
        tracing::debug!(
            event_name = "store.seed.skipped",
            existing_products,
            "products table already populated"
        );
        return Ok(SeedReport { existing_products, inserted: Vec::new() });
    }

    let mut inserted = Vec::with_capacity(DEMO_PRODUCTS.len());
    for product in DEMO_PRODUCTS {
        store
            .execute(
                "INSERT INTO products (sku, name, price, stock_quantity, min_stock_level) \
                 VALUES (?, ?, ?, ?, ?)",
                &[
                    json!(product.sku),
                    json!(product.name),
                    json!(product.price),
                    json!(product.stock_quantity),
                    json!(product.min_stock_level),
                ],
            )
            .await?;
        inserted.push(product.sku.to_string());
    }

    tracing::info!(
        event_name = "store.seed.completed",
        inserted = inserted.len(),
        "seeded ERP with sample products"
    );
    Ok(SeedReport { existing_products, inserted })
}

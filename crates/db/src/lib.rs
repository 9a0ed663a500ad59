pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod store;

pub use fixtures::{seed_if_empty, DemoProduct, SeedReport, DEMO_PRODUCTS};
pub use store::{ErpStore, RowMap, StoreError};

//! Simulated competitor price feed.
//!
//! Known products come from a fixed catalog. Unknown products get prices
//! from a generator seeded by the normalized identifier, so repeated
//! lookups agree without storing anything.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

pub const DEFAULT_COMPETITOR_COUNT: usize = 3;
pub const MAX_COMPETITOR_COUNT: usize = 10;

const SIMULATED_NOTE: &str = "Simulated competitor data for demo.";

/// Bounds for generated prices, in cents.
const MIN_GENERATED_CENTS: i64 = 500;
const MAX_GENERATED_CENTS: i64 = 15_000;

const CATALOG: &[(&str, &[i64])] = &[
    ("widget_a", &[2999, 3150, 2700]),
    ("widget_b", &[4500, 4499, 4800]),
    ("gadget_x", &[9999, 9500, 10200]),
    ("gadget_y", &[1599, 1450, 1600]),
    ("default", &[1000, 1200, 1150]),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompetitorPrices {
    pub product_identifier: String,
    #[serde(serialize_with = "serialize_float_list")]
    pub competitor_prices: Vec<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_price: Decimal,
    pub note: String,
}

impl CompetitorPrices {
    pub fn average(&self) -> Option<Decimal> {
        if self.competitor_prices.is_empty() {
            return None;
        }
        let total: Decimal = self.competitor_prices.iter().sum();
        Some((total / Decimal::from(self.competitor_prices.len())).round_dp(2))
    }
}

pub trait CompetitorPriceSource: Send + Sync {
    fn lookup(&self, product_identifier: &str, count: usize) -> CompetitorPrices;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedCompetitorPrices;

impl CompetitorPriceSource for SimulatedCompetitorPrices {
    fn lookup(&self, product_identifier: &str, count: usize) -> CompetitorPrices {
        let count = count.clamp(1, MAX_COMPETITOR_COUNT);
        let key = normalize_identifier(product_identifier);

        let mut prices = match catalog_prices(&key) {
            Some(cents) => cents.iter().take(count).map(|value| Decimal::new(*value, 2)).collect(),
            None => generated_prices(&key, count),
        };
        if prices.is_empty() {
            prices = catalog_prices("default")
                .unwrap_or_default()
                .iter()
                .map(|value| Decimal::new(*value, 2))
                .collect();
        }

        let min_price = prices.iter().min().copied().unwrap_or(Decimal::ZERO);
        let max_price = prices.iter().max().copied().unwrap_or(Decimal::ZERO);

        CompetitorPrices {
            product_identifier: product_identifier.to_string(),
            competitor_prices: prices,
            min_price,
            max_price,
            note: SIMULATED_NOTE.to_string(),
        }
    }
}

pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn catalog_prices(key: &str) -> Option<&'static [i64]> {
    CATALOG.iter().find(|(name, _)| *name == key).map(|(_, prices)| *prices)
}

fn generated_prices(key: &str, count: usize) -> Vec<Decimal> {
    let seed = *blake3::hash(key.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);
    (0..count)
        .map(|_| Decimal::new(rng.gen_range(MIN_GENERATED_CENTS..=MAX_GENERATED_CENTS), 2))
        .collect()
}

fn serialize_float_list<S>(values: &[Decimal], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(values.iter().map(|value| value.to_f64().unwrap_or_default()))
}

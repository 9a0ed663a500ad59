use rust_decimal::Decimal;

use stockpilot_core::config::PipelineConfig;
use stockpilot_core::domain::decision::ActionType;
use stockpilot_core::domain::report::FindingKind;

/// An action the execution stage is about to take on behalf of a decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    Reorder { finding_ref: String, finding_kind: FindingKind },
    PriceChange { sku: String, finding_kind: FindingKind, old_price: Decimal, new_price: Decimal },
}

impl GuardrailIntent {
    pub fn action(&self) -> ActionType {
        match self {
            Self::Reorder { .. } => ActionType::Reorder,
            Self::PriceChange { .. } => ActionType::DiscountCampaign,
        }
    }

    fn finding_kind(&self) -> FindingKind {
        match self {
            Self::Reorder { finding_kind, .. } | Self::PriceChange { finding_kind, .. } => {
                *finding_kind
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, message: String },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub max_discount_pct: u32,
    pub allow_price_increase: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { max_discount_pct: 30, allow_price_increase: false }
    }
}

impl GuardrailPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self { max_discount_pct: config.max_discount_pct, ..Self::default() }
    }

    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        let expected_kind = match intent.action() {
            ActionType::Reorder => FindingKind::LowStock,
            _ => FindingKind::Price,
        };
        if intent.finding_kind() != expected_kind {
            return GuardrailDecision::Deny {
                reason_code: "action_finding_mismatch",
                message: format!(
                    "{} cannot be applied to a {} finding",
                    intent.action().as_str(),
                    intent.finding_kind().as_str()
                ),
            };
        }

        match intent {
            GuardrailIntent::Reorder { .. } => GuardrailDecision::Allow,
            GuardrailIntent::PriceChange { sku, old_price, new_price, .. } => {
                self.evaluate_price(sku, *old_price, *new_price)
            }
        }
    }

    fn evaluate_price(&self, sku: &str, old_price: Decimal, new_price: Decimal) -> GuardrailDecision {
        if new_price <= Decimal::ZERO {
            return GuardrailDecision::Deny {
                reason_code: "price_not_positive",
                message: format!("new price {new_price} for {sku} must be positive"),
            };
        }
        if new_price == old_price || (new_price > old_price && !self.allow_price_increase) {
            return GuardrailDecision::Deny {
                reason_code: "price_not_reduced",
                message: format!(
                    "discount for {sku} must lower the price (current {old_price}, proposed {new_price})"
                ),
            };
        }
        if old_price > Decimal::ZERO && new_price < old_price {
            let discount_pct = (old_price - new_price) / old_price * Decimal::ONE_HUNDRED;
            if discount_pct > Decimal::from(self.max_discount_pct) {
                return GuardrailDecision::Deny {
                    reason_code: "discount_exceeds_limit",
                    message: format!(
                        "discount of {}% for {sku} exceeds the {}% limit",
                        discount_pct.round_dp(1),
                        self.max_discount_pct
                    ),
                };
            }
        }
        GuardrailDecision::Allow
    }
}

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::report::{Finding, FindingKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reorder,
    DiscountCampaign,
    NoAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reorder => "reorder",
            Self::DiscountCampaign => "discount_campaign",
            Self::NoAction => "no_action",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "reorder" | "reorder_stock" => Ok(Self::Reorder),
            "discount_campaign" | "discount" => Ok(Self::DiscountCampaign),
            "no_action" | "none" => Ok(Self::NoAction),
            other => Err(format!("unknown action `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategistDecision {
    pub finding_ref: String,
    pub action: ActionType,
    pub justification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_quantity: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub proposed_price: Option<Decimal>,
}

/// A decision as the strategist model wrote it, before it is matched
/// against the report's findings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProposedDecision {
    #[serde(default)]
    pub finding_ref: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub reorder_quantity: Option<u32>,
    #[serde(default)]
    pub proposed_price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedDecision {
    pub finding_ref: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Exactly one per finding, in finding order.
    pub decisions: Vec<StrategistDecision>,
    pub dropped: Vec<DroppedDecision>,
    /// References that received no usable decision and fell back to `no_action`.
    pub defaulted: Vec<String>,
}

/// Binds proposed decisions to findings. A proposal matches a finding by
/// full reference (`price:widget_a`) or by bare SKU. A bare SKU takes the
/// open finding for that SKU whose kind fits the action; `no_action` takes
/// the first open one. The first proposal for a finding wins.
pub fn reconcile_decisions(findings: &[Finding], proposed: Vec<ProposedDecision>) -> Reconciliation {
    let references: Vec<String> = findings.iter().map(Finding::reference).collect();
    let mut slots: Vec<Option<StrategistDecision>> = vec![None; findings.len()];
    let mut dropped = Vec::new();

    for proposal in proposed {
        let action = match proposal.action.parse::<ActionType>() {
            Ok(action) => action,
            Err(reason) => {
                dropped.push(DroppedDecision { finding_ref: proposal.finding_ref, reason });
                continue;
            }
        };

        let wanted = proposal.finding_ref.trim().to_ascii_lowercase();
        let slot = references
            .iter()
            .position(|reference| reference.eq_ignore_ascii_case(&wanted))
            .or_else(|| {
                findings.iter().enumerate().position(|(index, finding)| {
                    slots[index].is_none()
                        && finding.sku().eq_ignore_ascii_case(&wanted)
                        && action_fits(action, finding.kind())
                })
            });

        let Some(index) = slot else {
            let known_sku =
                findings.iter().any(|finding| finding.sku().eq_ignore_ascii_case(&wanted));
            let reason = if known_sku {
                format!("no open finding for `{wanted}` accepts {}", action.as_str())
            } else {
                "does not match any finding in the report".to_string()
            };
            dropped.push(DroppedDecision { finding_ref: proposal.finding_ref, reason });
            continue;
        };
        if slots[index].is_some() {
            dropped.push(DroppedDecision {
                finding_ref: proposal.finding_ref,
                reason: format!("duplicate decision for {}", references[index]),
            });
            continue;
        }

        slots[index] = Some(StrategistDecision {
            finding_ref: references[index].clone(),
            action,
            justification: proposal.justification.trim().to_string(),
            reorder_quantity: proposal.reorder_quantity.filter(|quantity| *quantity > 0),
            proposed_price: proposal
                .proposed_price
                .and_then(Decimal::from_f64)
                .map(|price| price.round_dp(2))
                .filter(|price| *price > Decimal::ZERO),
        });
    }

    let mut defaulted = Vec::new();
    let decisions = slots
        .into_iter()
        .zip(references)
        .map(|(slot, reference)| {
            slot.unwrap_or_else(|| {
                defaulted.push(reference.clone());
                StrategistDecision {
                    finding_ref: reference,
                    action: ActionType::NoAction,
                    justification: "No decision was returned for this finding.".to_string(),
                    reorder_quantity: None,
                    proposed_price: None,
                }
            })
        })
        .collect();

    Reconciliation { decisions, dropped, defaulted }
}

fn action_fits(action: ActionType, kind: FindingKind) -> bool {
    match action {
        ActionType::Reorder => kind == FindingKind::LowStock,
        ActionType::DiscountCampaign => kind == FindingKind::Price,
        ActionType::NoAction => true,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{reconcile_decisions, ActionType, ProposedDecision};
    use crate::domain::product::ProductId;
    use crate::domain::report::{Finding, LowStockItem, PriceFinding};

    fn findings() -> Vec<Finding> {
        vec![
            Finding::LowStock(LowStockItem {
                product_id: ProductId(1),
                sku: "widget_a".to_string(),
                name: "Widget A".to_string(),
                current_stock: 5,
                min_stock_level: 15,
            }),
            Finding::LowStock(LowStockItem {
                product_id: ProductId(3),
                sku: "gadget_x".to_string(),
                name: "Gadget X".to_string(),
                current_stock: 3,
                min_stock_level: 10,
            }),
            Finding::Price(PriceFinding {
                product_id: ProductId(1),
                sku: "widget_a".to_string(),
                our_price: Decimal::new(3299, 2),
                competitor_min: Decimal::new(2700, 2),
                competitor_avg: None,
            }),
        ]
    }

    fn proposal(finding_ref: &str, action: &str) -> ProposedDecision {
        ProposedDecision {
            finding_ref: finding_ref.to_string(),
            action: action.to_string(),
            justification: "because".to_string(),
            ..ProposedDecision::default()
        }
    }

    #[test]
    fn action_aliases_parse() {
        assert_eq!("Discount".parse::<ActionType>(), Ok(ActionType::DiscountCampaign));
        assert_eq!("none".parse::<ActionType>(), Ok(ActionType::NoAction));
        assert_eq!("reorder".parse::<ActionType>(), Ok(ActionType::Reorder));
        assert!("liquidate".parse::<ActionType>().is_err());
    }

    #[test]
    fn one_decision_per_finding_in_finding_order() {
        let result = reconcile_decisions(
            &findings(),
            vec![
                ProposedDecision {
                    proposed_price: Some(27.5),
                    ..proposal("price:widget_a", "discount_campaign")
                },
                proposal("low_stock:widget_a", "reorder"),
            ],
        );

        let refs: Vec<&str> =
            result.decisions.iter().map(|decision| decision.finding_ref.as_str()).collect();
        assert_eq!(refs, vec!["low_stock:widget_a", "low_stock:gadget_x", "price:widget_a"]);
        assert_eq!(result.decisions[0].action, ActionType::Reorder);
        assert_eq!(result.decisions[1].action, ActionType::NoAction);
        assert_eq!(result.decisions[2].proposed_price, Some(Decimal::new(2750, 2)));
        assert_eq!(result.defaulted, vec!["low_stock:gadget_x".to_string()]);
    }

    #[test]
    fn bare_skus_in_listing_order_bind_to_their_findings() {
        let result = reconcile_decisions(
            &findings(),
            vec![proposal("widget_a", "reorder"), proposal("WIDGET_A", "discount")],
        );

        assert_eq!(result.decisions[0].action, ActionType::Reorder);
        assert_eq!(result.decisions[2].action, ActionType::DiscountCampaign);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn bare_skus_follow_the_action_not_the_listing_order() {
        let result = reconcile_decisions(
            &findings(),
            vec![proposal("widget_a", "discount_campaign"), proposal("widget_a", "reorder")],
        );

        assert_eq!(result.decisions[0].finding_ref, "low_stock:widget_a");
        assert_eq!(result.decisions[0].action, ActionType::Reorder);
        assert_eq!(result.decisions[2].finding_ref, "price:widget_a");
        assert_eq!(result.decisions[2].action, ActionType::DiscountCampaign);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn bare_sku_without_a_fitting_finding_is_dropped() {
        let result = reconcile_decisions(&findings(), vec![proposal("gadget_x", "discount")]);

        assert_eq!(result.decisions[1].action, ActionType::NoAction);
        assert_eq!(result.dropped.len(), 1);
        assert!(result.dropped[0].reason.contains("accepts discount_campaign"));
    }

    #[test]
    fn bare_sku_no_action_takes_the_first_open_finding() {
        let result = reconcile_decisions(
            &findings(),
            vec![proposal("low_stock:widget_a", "reorder"), proposal("widget_a", "no_action")],
        );

        assert_eq!(result.decisions[0].action, ActionType::Reorder);
        assert_eq!(result.decisions[2].action, ActionType::NoAction);
        assert!(result.defaulted.is_empty());
    }

    #[test]
    fn fabricated_and_duplicate_references_are_dropped() {
        let result = reconcile_decisions(
            &findings(),
            vec![
                proposal("low_stock:gadget_x", "reorder"),
                proposal("low_stock:gadget_x", "no_action"),
                proposal("sprocket_9", "reorder"),
                proposal("price:widget_a", "liquidate"),
            ],
        );

        assert_eq!(result.decisions.len(), 3);
        assert_eq!(result.decisions[1].action, ActionType::Reorder);
        assert_eq!(result.dropped.len(), 3);
        assert!(result.dropped[0].reason.contains("duplicate"));
        assert!(result.dropped[1].reason.contains("does not match"));
        assert!(result.dropped[2].reason.contains("unknown action"));
        assert_eq!(result.decisions[2].action, ActionType::NoAction);
    }

    #[test]
    fn zero_reorder_quantity_is_ignored() {
        let result = reconcile_decisions(
            &findings(),
            vec![ProposedDecision {
                reorder_quantity: Some(0),
                ..proposal("low_stock:widget_a", "reorder")
            }],
        );

        assert_eq!(result.decisions[0].reorder_quantity, None);
    }

    #[test]
    fn placeholder_prices_are_ignored() {
        let result = reconcile_decisions(
            &findings(),
            vec![ProposedDecision {
                proposed_price: Some(0.0),
                ..proposal("price:widget_a", "discount_campaign")
            }],
        );

        assert_eq!(result.decisions[2].action, ActionType::DiscountCampaign);
        assert_eq!(result.decisions[2].proposed_price, None);
    }
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tera::{Context, Tera};

use stockpilot_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use stockpilot_core::domain::decision::{ActionType, StrategistDecision};
use stockpilot_core::domain::execution::{ExecutionResult, PriceChange};
use stockpilot_core::domain::product::money_column;
use stockpilot_core::domain::report::{Finding, LowStockItem, PriceFinding};
use stockpilot_core::pipeline::{PipelineContext, StageKind};

use super::{StageCapabilities, StageError, StageOutput};
use crate::extract::parse_object;
use crate::guardrails::{GuardrailDecision, GuardrailIntent};
use crate::llm::CompletionRequest;
use crate::prompts::EXECUTION_OFFICER;
use crate::tools::{EmailMessage, EmailOutcome, ErpOutcome, ErpRequest};

const REORDER_TEMPLATE_NAME: &str = "reorder_email";
const REORDER_TEMPLATE: &str = "Hello,

Please arrange a restock of {{ name }} (SKU {{ sku }}).

Current stock: {{ current_stock }} units
Minimum stock level: {{ min_stock_level }} units
Requested quantity: {{ quantity }} units
{% if justification %}
{{ justification }}
{% endif %}
Thank you,
Inventory Operations
";

const LOG_ACTION: &str =
    "INSERT INTO inventory_logs (product_id, action, quantity, note) VALUES (?, ?, ?, ?)";
const CURRENT_PRICE: &str = "SELECT id, price FROM products WHERE sku = ?";
const UPDATE_PRICE: &str =
    "UPDATE products SET price = ?, updated_at = CURRENT_TIMESTAMP WHERE sku = ?";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EmailDraft {
    #[serde(default)]
    pub finding_ref: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
struct DraftEnvelope {
    #[serde(default)]
    emails: Vec<EmailDraft>,
}

/// Restock up to twice the minimum level; always at least one unit.
pub fn default_reorder_quantity(item: &LowStockItem) -> i64 {
    item.min_stock_level.saturating_mul(2).saturating_sub(item.current_stock).max(1)
}

pub fn render_reorder_email(
    item: &LowStockItem,
    quantity: i64,
    justification: &str,
) -> Result<(String, String), tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(REORDER_TEMPLATE_NAME, REORDER_TEMPLATE)?;

    let mut context = Context::new();
    context.insert("name", &item.name);
    context.insert("sku", &item.sku);
    context.insert("current_stock", &item.current_stock);
    context.insert("min_stock_level", &item.min_stock_level);
    context.insert("quantity", &quantity);
    context.insert("justification", justification.trim());

    let body = tera.render(REORDER_TEMPLATE_NAME, &context)?;
    Ok((format!("Reorder request: {} ({})", item.name, item.sku), body))
}

pub async fn run(
    context: &PipelineContext,
    capabilities: &StageCapabilities<'_>,
) -> Result<StageOutput, StageError> {
    let report = context.report.as_ref().ok_or(StageError::MissingContext {
        stage: StageKind::Execute,
        artifact: "analyst_report",
    })?;
    let decisions = context.decisions.as_ref().ok_or(StageError::MissingContext {
        stage: StageKind::Execute,
        artifact: "strategist_decisions",
    })?;

    let reorders: Vec<&StrategistDecision> =
        decisions.iter().filter(|decision| decision.action == ActionType::Reorder).collect();
    let (drafts, transcript) = if reorders.is_empty() {
        (Vec::new(), String::new())
    } else {
        draft_emails(context, capabilities, &reorders).await?
    };

    let mut result = ExecutionResult::default();
    for decision in decisions {
        if decision.action == ActionType::NoAction {
            continue;
        }
        let Some(finding) = report.finding_by_reference(&decision.finding_ref) else {
            result.record_error(format!("{}: finding not present in report", decision.finding_ref));
            continue;
        };

        let intent = match (&decision.action, &finding) {
            (ActionType::Reorder, _) => GuardrailIntent::Reorder {
                finding_ref: decision.finding_ref.clone(),
                finding_kind: finding.kind(),
            },
            (_, Finding::Price(price)) => GuardrailIntent::PriceChange {
                sku: price.sku.clone(),
                finding_kind: finding.kind(),
                old_price: price.our_price,
                new_price: target_price(decision, price),
            },
            (_, Finding::LowStock(item)) => GuardrailIntent::PriceChange {
                sku: item.sku.clone(),
                finding_kind: finding.kind(),
                old_price: Decimal::ZERO,
                new_price: Decimal::ZERO,
            },
        };
        if let GuardrailDecision::Deny { reason_code, message } =
            capabilities.guardrails.evaluate(&intent)
        {
            deny(capabilities, &mut result, decision, reason_code, &message);
            continue;
        }

        match finding {
            Finding::LowStock(item) => {
                let draft = drafts.iter().find(|draft| {
                    draft.finding_ref.trim().eq_ignore_ascii_case(&decision.finding_ref)
                        && !draft.subject.trim().is_empty()
                        && !draft.body.trim().is_empty()
                });
                execute_reorder(capabilities, &mut result, decision, &item, draft).await;
            }
            Finding::Price(price) => {
                execute_discount(capabilities, &mut result, decision, &price).await;
            }
        }
    }

    tracing::info!(
        event_name = "stage.execute.finished",
        run_id = %context.run_id,
        emails_sent = result.emails_sent.len(),
        prices_updated = result.prices_updated.len(),
        errors = result.errors.len(),
        "execution finished"
    );
    Ok(StageOutput::Execution { result, transcript })
}

fn target_price(decision: &StrategistDecision, finding: &PriceFinding) -> Decimal {
    decision.proposed_price.unwrap_or(finding.competitor_min).round_dp(2)
}

async fn draft_emails(
    context: &PipelineContext,
    capabilities: &StageCapabilities<'_>,
    reorders: &[&StrategistDecision],
) -> Result<(Vec<EmailDraft>, String), StageError> {
    let report = context.report.as_ref();
    let requests = reorders
        .iter()
        .map(|decision| {
            let item = report.and_then(|report| {
                report.low_stock_items.iter().find(|item| {
                    decision.finding_ref == format!("low_stock:{}", item.sku)
                })
            });
            let quantity = decision
                .reorder_quantity
                .map(i64::from)
                .or_else(|| item.map(default_reorder_quantity))
                .unwrap_or(1);
            json!({
                "finding_ref": decision.finding_ref,
                "product": item.map(|item| item.name.as_str()),
                "sku": item.map(|item| item.sku.as_str()),
                "current_stock": item.map(|item| item.current_stock),
                "min_stock_level": item.map(|item| item.min_stock_level),
                "quantity": quantity,
                "justification": decision.justification,
            })
        })
        .collect::<Vec<Value>>();
    let requests_json = serde_json::to_string_pretty(&requests).unwrap_or_default();
    let strategist_output = context.transcript(StageKind::Strategize).unwrap_or_default();
    let user = EXECUTION_OFFICER.user(&[
        ("Reorder decisions", requests_json.as_str()),
        ("Strategist output", strategist_output),
    ]);

    let completion = capabilities
        .llm
        .complete(&CompletionRequest::new(EXECUTION_OFFICER.system(), user))
        .await
        .map_err(|error| StageError::llm(StageKind::Execute, &error))?;

    let drafts = match parse_object::<DraftEnvelope>(&completion) {
        Ok(envelope) => envelope.emails,
        Err(error) => {
            tracing::warn!(
                event_name = "stage.execute.drafts_unusable",
                run_id = %context.run_id,
                error = %error,
                "email drafts could not be parsed; using templates"
            );
            Vec::new()
        }
    };
    Ok((drafts, completion))
}

async fn execute_reorder(
    capabilities: &StageCapabilities<'_>,
    result: &mut ExecutionResult,
    decision: &StrategistDecision,
    item: &LowStockItem,
    draft: Option<&EmailDraft>,
) {
    let quantity = decision
        .reorder_quantity
        .map(i64::from)
        .unwrap_or_else(|| default_reorder_quantity(item));
    let (subject, body) = match draft {
        Some(draft) => (draft.subject.trim().to_string(), draft.body.trim().to_string()),
        None => match render_reorder_email(item, quantity, &decision.justification) {
            Ok(rendered) => rendered,
            Err(error) => {
                result.record_error(format!(
                    "{}: reorder email could not be rendered: {error}",
                    decision.finding_ref
                ));
                return;
            }
        },
    };

    let recipient = capabilities.pipeline.supplier_email.clone();
    let outcome = capabilities
        .email
        .send(&EmailMessage {
            to_email: recipient.clone(),
            subject,
            body,
            reply_to: capabilities.pipeline.reply_to.clone(),
        })
        .await;
    if let EmailOutcome::Failed { message } = outcome {
        result.record_error(format!(
            "{}: email to {recipient} failed: {message}",
            decision.finding_ref
        ));
        return;
    }
    result.record_email(recipient.clone());
    emit(capabilities, "execution.reorder_requested", AuditCategory::Notification, &[
        ("finding_ref", decision.finding_ref.as_str()),
        ("to", recipient.as_str()),
    ]);

    let note = format!("Reorder of {quantity} units requested from {recipient}");
    let logged = capabilities
        .erp
        .run(&ErpRequest::write(
            LOG_ACTION,
            vec![json!(item.product_id.0), json!("reorder_requested"), json!(quantity), json!(note)],
        ))
        .await;
    if let Some(error) = logged.error() {
        result.record_error(format!("{}: inventory log failed: {error}", decision.finding_ref));
    }
}

async fn execute_discount(
    capabilities: &StageCapabilities<'_>,
    result: &mut ExecutionResult,
    decision: &StrategistDecision,
    finding: &PriceFinding,
) {
    let reference = decision.finding_ref.as_str();
    let current = capabilities
        .erp
        .run(&ErpRequest::read_with(CURRENT_PRICE, vec![json!(finding.sku)]))
        .await;
    let (product_id, old_price) = match current {
        ErpOutcome::Rows(rows) => {
            let Some(row) = rows.first() else {
                result.record_error(format!("{reference}: product {} not found", finding.sku));
                return;
            };
            let id = row.get("id").and_then(Value::as_i64).unwrap_or(finding.product_id.0);
            match money_column(row, "price") {
                Ok(price) => (id, price),
                Err(error) => {
                    result.record_error(format!("{reference}: {error}"));
                    return;
                }
            }
        }
        ErpOutcome::Error(error) => {
            result.record_error(format!("{reference}: {error}"));
            return;
        }
        ErpOutcome::RowCount(_) => {
            result.record_error(format!("{reference}: unexpected write result on read"));
            return;
        }
    };

    let new_price = target_price(decision, finding);
    // The price may have moved since analysis; check again against the live value.
    let intent = GuardrailIntent::PriceChange {
        sku: finding.sku.clone(),
        finding_kind: Finding::Price(finding.clone()).kind(),
        old_price,
        new_price,
    };
    if let GuardrailDecision::Deny { reason_code, message } = capabilities.guardrails.evaluate(&intent)
    {
        deny(capabilities, result, decision, reason_code, &message);
        return;
    }

    let Some(price_param) = new_price.to_f64() else {
        result.record_error(format!("{reference}: price {new_price} is not representable"));
        return;
    };
    match capabilities
        .erp
        .run(&ErpRequest::write(UPDATE_PRICE, vec![json!(price_param), json!(finding.sku)]))
        .await
    {
        ErpOutcome::RowCount(0) => {
            result.record_error(format!("{reference}: no product row was updated"));
            return;
        }
        ErpOutcome::RowCount(_) => {}
        ErpOutcome::Error(error) => {
            result.record_error(format!("{reference}: {error}"));
            return;
        }
        ErpOutcome::Rows(_) => {
            result.record_error(format!("{reference}: unexpected read result on write"));
            return;
        }
    }

    result.record_price_change(PriceChange { sku: finding.sku.clone(), old_price, new_price });
    emit(capabilities, "execution.price_updated", AuditCategory::Store, &[
        ("sku", finding.sku.as_str()),
        ("old_price", old_price.to_string().as_str()),
        ("new_price", new_price.to_string().as_str()),
    ]);

    let note = format!("Discount campaign: price {old_price} -> {new_price}");
    let logged = capabilities
        .erp
        .run(&ErpRequest::write(
            LOG_ACTION,
            vec![json!(product_id), json!("price_update"), json!(0), json!(note)],
        ))
        .await;
    if let Some(error) = logged.error() {
        result.record_error(format!("{reference}: inventory log failed: {error}"));
    }
}

fn deny(
    capabilities: &StageCapabilities<'_>,
    result: &mut ExecutionResult,
    decision: &StrategistDecision,
    reason_code: &'static str,
    message: &str,
) {
    tracing::warn!(
        event_name = "stage.execute.guardrail_denied",
        finding_ref = %decision.finding_ref,
        action = decision.action.as_str(),
        reason_code,
        "action blocked by guardrail"
    );
    capabilities.audit.emit(
        AuditEvent::from_context(
            capabilities.audit_context,
            "execution.action_denied",
            AuditCategory::Pipeline,
            AuditOutcome::Rejected,
        )
        .with_metadata("finding_ref", decision.finding_ref.clone())
        .with_metadata("reason_code", reason_code),
    );
    result.record_error(format!("{}: {reason_code}: {message}", decision.finding_ref));
}

fn emit(
    capabilities: &StageCapabilities<'_>,
    event_type: &str,
    category: AuditCategory,
    metadata: &[(&str, &str)],
) {
    let event = metadata.iter().fold(
        AuditEvent::from_context(
            capabilities.audit_context,
            event_type,
            category,
            AuditOutcome::Success,
        ),
        |event, (key, value)| event.with_metadata(*key, *value),
    );
    capabilities.audit.emit(event);
}

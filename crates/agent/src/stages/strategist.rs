use serde::Deserialize;

use stockpilot_core::domain::decision::{reconcile_decisions, ProposedDecision};
use stockpilot_core::domain::report::Finding;
use stockpilot_core::pipeline::{PipelineContext, StageKind};

use super::{StageCapabilities, StageError, StageOutput};
use crate::extract::parse_object;
use crate::llm::CompletionRequest;
use crate::prompts::STRATEGIST;

const NOTHING_TO_DECIDE: &str = "No findings were raised; no decisions required.";

#[derive(Debug, Default, Deserialize)]
struct DecisionEnvelope {
    #[serde(default)]
    decisions: Vec<ProposedDecision>,
}

fn describe(finding: &Finding) -> String {
    match finding {
        Finding::LowStock(item) => format!(
            "- {}: {} has {} units in stock, minimum level is {}",
            finding.reference(),
            item.name,
            item.current_stock,
            item.min_stock_level
        ),
        Finding::Price(price) => format!(
            "- {}: our price {} vs lowest competitor {}{}",
            finding.reference(),
            price.our_price,
            price.competitor_min,
            price
                .competitor_avg
                .map(|avg| format!(" (competitor average {avg})"))
                .unwrap_or_default()
        ),
    }
}

pub async fn run(
    context: &PipelineContext,
    capabilities: &StageCapabilities<'_>,
) -> Result<StageOutput, StageError> {
    let report = context.report.as_ref().ok_or(StageError::MissingContext {
        stage: StageKind::Strategize,
        artifact: "analyst_report",
    })?;
    let findings = report.findings();
    if findings.is_empty() {
        tracing::info!(
            event_name = "stage.strategize.skipped",
            run_id = %context.run_id,
            "no findings to decide on"
        );
        return Ok(StageOutput::Decisions {
            decisions: Vec::new(),
            transcript: NOTHING_TO_DECIDE.to_string(),
        });
    }

    let finding_list = findings.iter().map(describe).collect::<Vec<_>>().join("\n");
    let report_json = serde_json::to_string_pretty(report).unwrap_or_default();
    let analyst_output = context.transcript(StageKind::Analyze).unwrap_or_default();
    let user = STRATEGIST.user(&[
        ("Findings", finding_list.as_str()),
        ("Analyst report", report_json.as_str()),
        ("Analyst commentary", analyst_output),
    ]);

    let completion = capabilities
        .llm
        .complete(&CompletionRequest::new(STRATEGIST.system(), user))
        .await
        .map_err(|error| StageError::llm(StageKind::Strategize, &error))?;

    let envelope: DecisionEnvelope = parse_object(&completion).map_err(|error| {
        StageError::MalformedOutput { stage: StageKind::Strategize, reason: error.to_string() }
    })?;
    let reconciliation = reconcile_decisions(&findings, envelope.decisions);

    for dropped in &reconciliation.dropped {
        tracing::warn!(
            event_name = "stage.strategize.decision_dropped",
            run_id = %context.run_id,
            finding_ref = %dropped.finding_ref,
            reason = %dropped.reason,
            "strategist decision discarded"
        );
    }
    if !reconciliation.defaulted.is_empty() {
        tracing::warn!(
            event_name = "stage.strategize.decisions_defaulted",
            run_id = %context.run_id,
            findings = %reconciliation.defaulted.join(","),
            "findings without a decision default to no_action"
        );
    }
    tracing::info!(
        event_name = "stage.strategize.decided",
        run_id = %context.run_id,
        decisions = reconciliation.decisions.len(),
        "strategy recorded"
    );

    Ok(StageOutput::Decisions { decisions: reconciliation.decisions, transcript: completion })
}

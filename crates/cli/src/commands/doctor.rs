use serde::Serialize;
use stockpilot_core::config::{AppConfig, LoadOptions};
use stockpilot_db::ErpStore;

use crate::commands::{CommandResult, EXIT_CONFIG, EXIT_RUNTIME, EXIT_STORE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
    #[serde(skip)]
    exit_code: u8,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into(), exit_code: 0 }
    }

    fn fail(name: &'static str, details: impl Into<String>, exit_code: u8) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into(), exit_code }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
            exit_code: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = report
        .checks
        .iter()
        .find(|check| check.status == CheckStatus::Fail)
        .map(|check| check.exit_code)
        .unwrap_or(0);

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
}

fn build_report(options: &LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options.clone()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_credentials(&config));
            checks.push(check_database(&config));
            checks.push(check_email_transport(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string(), EXIT_CONFIG));
            checks.push(DoctorCheck::skipped("llm_credentials"));
            checks.push(DoctorCheck::skipped("database_schema"));
            checks.push(DoctorCheck::skipped("email_transport"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_credentials(config: &AppConfig) -> DoctorCheck {
    match config.llm.ensure_credentials() {
        Ok(()) => DoctorCheck::pass(
            "llm_credentials",
            format!("provider `{}` with model `{}`", config.llm.provider.as_str(), config.llm.model()),
        ),
        Err(error) => DoctorCheck::fail("llm_credentials", error.to_string(), EXIT_CONFIG),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_schema",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    let result = runtime.block_on(async {
        let store = ErpStore::from_config(&config.database)
            .await
            .map_err(|error| format!("failed to open store: {error}"))?;
        let missing = store
            .missing_schema_objects()
            .await
            .map_err(|error| format!("failed to inspect schema: {error}"))?;
        if missing.is_empty() {
            Ok(store.path().display().to_string())
        } else {
            Err(format!("missing schema objects: {}", missing.join(", ")))
        }
    });

    match result {
        Ok(path) => DoctorCheck::pass("database_schema", format!("schema ready at `{path}`")),
        Err(error) => DoctorCheck::fail("database_schema", error, EXIT_STORE),
    }
}

fn check_email_transport(config: &AppConfig) -> DoctorCheck {
    if config.smtp.mock_mode {
        DoctorCheck::pass("email_transport", "mock mode: supplier emails are logged, not sent")
    } else {
        DoctorCheck::pass(
            "email_transport",
            format!(
                "live SMTP via {}:{} as {}",
                config.smtp.host,
                config.smtp.port,
                config.smtp.sender_address()
            ),
        )
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

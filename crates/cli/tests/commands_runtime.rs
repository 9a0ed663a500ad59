use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use stockpilot_agent::{CompletionRequest, LlmClient};
use stockpilot_cli::commands::{doctor, migrate, run, seed, tool};
use stockpilot_core::config::{AppConfig, LoadOptions};

struct FixedLlm {
    strategist: &'static str,
}

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        if request.system.contains("Business Strategist") {
            Ok(self.strategist.to_string())
        } else if request.system.contains("Execution Officer") {
            Ok("no drafts today".to_string())
        } else {
            Ok("Two items are below their minimum stock level.".to_string())
        }
    }
}

struct DownLlm;

#[async_trait]
impl LlmClient for DownLlm {
    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        Err(anyhow!("provider returned 503 Service Unavailable"))
    }
}

const REORDER_ALL: &str = r#"{"decisions": [
    {"finding_ref": "low_stock:widget_a", "action": "reorder", "justification": "Below minimum"},
    {"finding_ref": "low_stock:gadget_x", "action": "reorder", "justification": "Below minimum"}
]}"#;

#[test]
fn migrate_creates_schema_in_configured_store() {
    with_env(&[], || {
        let (dir, options) = config_file("");

        let result = migrate::run(&options);

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
        assert!(dir.path().join("data/erp.db").exists());
    });
}

#[test]
fn seed_loads_demo_catalog_once() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let first = parse_payload(&seed::run(&options).output);
        let second = parse_payload(&seed::run(&options).output);

        assert_eq!(first["status"], "ok");
        assert_eq!(
            first["message"],
            "loaded 4 demo products: widget_a, widget_b, gadget_x, gadget_y"
        );
        assert_eq!(second["message"], "products table already holds 4 rows; demo catalog not loaded");
    });
}

#[test]
fn run_without_credentials_is_a_configuration_failure() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let result = run::run(&options);

        assert_eq!(result.exit_code, 2);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("configuration issue: "), "unexpected message: {message}");
        assert!(message.contains("OPENAI_API_KEY"));
        assert!(payload.get("data").is_none());
    });
}

#[test]
fn run_reports_execution_result_in_envelope() {
    with_env(&[], || {
        let (_dir, options) = config_file("");
        let config = AppConfig::load(options).expect("config");

        let result = run::run_with_client(&config, Arc::new(FixedLlm { strategist: REORDER_ALL }));

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["state"], "Completed");
        assert_eq!(
            payload["data"]["result"]["emails_sent"],
            serde_json::json!(["supplier@example.com", "supplier@example.com"])
        );
        assert_eq!(payload["data"]["result"]["errors"], serde_json::json!([]));
        assert!(payload["message"].as_str().unwrap_or_default().contains("2 emails sent"));
    });
}

#[test]
fn model_outage_aborts_with_pipeline_exit_code() {
    with_env(&[], || {
        let (_dir, options) = config_file("");
        let config = AppConfig::load(options).expect("config");

        let result = run::run_with_client(&config, Arc::new(DownLlm));

        assert_eq!(result.exit_code, 5);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "pipeline");
        assert_eq!(payload["data"]["state"], "Aborted");
        assert!(payload["message"].as_str().unwrap_or_default().contains("503"));
    });
}

#[test]
fn tool_command_looks_up_competitor_prices() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let result = tool::run(&options, "competitor_prices", "widget_a");

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["product_identifier"], "widget_a");
        assert_eq!(payload["data"]["min_price"], serde_json::json!(27.0));
    });
}

#[test]
fn tool_command_reports_store_errors_as_results() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let result = tool::run(&options, "erp_database", r#"{"query": "SELECT * FROM missing"}"#);

        assert_eq!(result.exit_code, 0);
        let payload = parse_payload(&result.output);
        assert!(payload["data"]["error"].as_str().unwrap_or_default().starts_with("Query error:"));
    });
}

#[test]
fn tool_command_rejects_bad_input_and_unknown_tools() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let ambiguous = tool::run(
            &options,
            "erp_database",
            r#"{"query": "SELECT 1", "statement": "DELETE FROM products"}"#,
        );
        let unknown = tool::run(&options, "web_scraper", "{}");

        assert_eq!(ambiguous.exit_code, 6);
        assert_eq!(parse_payload(&ambiguous.output)["error_class"], "tool_input");
        assert_eq!(unknown.exit_code, 6);
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_tool");
    });
}

#[test]
fn doctor_flags_missing_credentials() {
    with_env(&[], || {
        let (_dir, options) = config_file("");

        let result = doctor::run(&options, true);

        assert_eq!(result.exit_code, 2);
        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().expect("checks");
        let status = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status("config_validation"), "pass");
        assert_eq!(status("llm_credentials"), "fail");
        assert_eq!(status("database_schema"), "pass");
        assert_eq!(status("email_transport"), "pass");
    });
}

#[test]
fn doctor_passes_with_ollama_provider() {
    with_env(&[("STOCKPILOT_LLM_PROVIDER", "ollama")], || {
        let (_dir, options) = config_file("");

        let result = doctor::run(&options, false);

        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);
        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] llm_credentials: provider `ollama`"));
    });
}

#[test]
fn in_memory_store_is_rejected_by_config() {
    with_env(&[("STOCKPILOT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run(&LoadOptions::default());

        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn explicit_config_path_must_exist() {
    with_env(&[], || {
        let options = LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/stockpilot.toml")),
            require_file: true,
            ..LoadOptions::default()
        };

        let result = seed::run(&options);

        assert_eq!(result.exit_code, 2);
        assert!(parse_payload(&result.output)["message"]
            .as_str()
            .unwrap_or_default()
            .contains("required config file was not found"));
    });
}

fn config_file(extra: &str) -> (tempfile::TempDir, LoadOptions) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stockpilot.toml");
    let contents = format!(
        "[database]\nurl = '{}'\n\n[smtp]\nmock_mode = true\n{extra}",
        database_url(dir.path())
    );
    fs::write(&path, contents).expect("write config");
    let options = LoadOptions {
        config_path: Some(path),
        require_file: true,
        ..LoadOptions::default()
    };
    (dir, options)
}

fn database_url(root: &Path) -> String {
    format!("sqlite://{}", root.join("data/erp.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "STOCKPILOT_DATABASE_URL",
        "STOCKPILOT_DATABASE_TIMEOUT_SECS",
        "STOCKPILOT_LLM_PROVIDER",
        "LLM_PROVIDER",
        "STOCKPILOT_LLM_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "STOCKPILOT_LLM_BASE_URL",
        "STOCKPILOT_LLM_MODEL",
        "STOCKPILOT_LLM_TIMEOUT_SECS",
        "STOCKPILOT_SMTP_HOST",
        "STOCKPILOT_SMTP_PORT",
        "STOCKPILOT_SMTP_USERNAME",
        "STOCKPILOT_SMTP_PASSWORD",
        "STOCKPILOT_SMTP_USE_TLS",
        "STOCKPILOT_SMTP_MOCK_MODE",
        "STOCKPILOT_SMTP_FROM_ADDRESS",
        "STOCKPILOT_SMTP_TIMEOUT_SECS",
        "STOCKPILOT_PIPELINE_SUPPLIER_EMAIL",
        "STOCKPILOT_PIPELINE_REPLY_TO",
        "STOCKPILOT_PIPELINE_COMPETITOR_COUNT",
        "STOCKPILOT_PIPELINE_PRICE_TOLERANCE_PCT",
        "STOCKPILOT_PIPELINE_MAX_DISCOUNT_PCT",
        "STOCKPILOT_LOGGING_LEVEL",
        "STOCKPILOT_LOGGING_FORMAT",
        "STOCKPILOT_LOG_LEVEL",
        "STOCKPILOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

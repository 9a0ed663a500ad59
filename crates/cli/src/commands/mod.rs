pub mod doctor;
pub mod migrate;
pub mod run;
pub mod seed;
pub mod tool;

use serde::Serialize;
use serde_json::Value;
use stockpilot_core::config::{AppConfig, LoadOptions};
use stockpilot_core::errors::ApplicationError;
use stockpilot_db::{ErpStore, StoreError};
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_STORE: u8 = 4;
pub const EXIT_TOOL_INPUT: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message, None)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        Self::ok(command, message, Some(data))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::error(command, error_class, message, exit_code, None)
    }

    fn ok(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    fn error(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str, options: &LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        application_failure(command, &ApplicationError::Configuration(error.to_string()), None)
    })
}

pub(crate) fn application_failure(
    command: &str,
    error: &ApplicationError,
    data: Option<Value>,
) -> CommandResult {
    CommandResult::error(command, error.error_class(), error.to_string(), error.exit_code(), data)
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) async fn open_store(command: &str, config: &AppConfig) -> Result<ErpStore, CommandResult> {
    ErpStore::from_config(&config.database).await.map_err(|error| store_failure(command, &error))
}

pub(crate) fn store_failure(command: &str, error: &StoreError) -> CommandResult {
    let error_class = match error {
        StoreError::Migration(_) => "migration",
        _ => "db_connectivity",
    };
    CommandResult::failure(command, error_class, error.to_string(), EXIT_STORE)
}

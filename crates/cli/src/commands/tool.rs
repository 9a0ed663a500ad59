use serde_json::Value;
use stockpilot_agent::tools::{standard_registry, ToolError};
use stockpilot_core::config::LoadOptions;

use crate::commands::{build_runtime, load_config, open_store, CommandResult, EXIT_TOOL_INPUT};

const COMMAND: &str = "tool";

/// Calls one tool directly. Input that is not JSON is passed through as a
/// plain string, which the price lookup accepts as a product identifier.
pub fn run(options: &LoadOptions, name: &str, input: &str) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let input = parse_input(input);

    runtime.block_on(async {
        let store = match open_store(COMMAND, &config).await {
            Ok(store) => store,
            Err(result) => return result,
        };
        let registry = standard_registry(store, &config);
        match registry.invoke(name, input).await {
            Ok(value) => CommandResult::success_with_data(COMMAND, format!("`{name}` completed"), value),
            Err(error) => {
                let error_class = match error {
                    ToolError::UnknownTool(_) => "unknown_tool",
                    ToolError::InvalidInput { .. } => "tool_input",
                    ToolError::Encoding { .. } => "tool_output",
                };
                CommandResult::failure(COMMAND, error_class, error.to_string(), EXIT_TOOL_INPUT)
            }
        }
    })
}

fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

use stockpilot_core::config::LoadOptions;

use crate::commands::{build_runtime, load_config, open_store, store_failure, CommandResult};

const COMMAND: &str = "migrate";

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        // Opening the store applies any pending migrations.
        let store = match open_store(COMMAND, &config).await {
            Ok(store) => store,
            Err(result) => return result,
        };
        match store.missing_schema_objects().await {
            Ok(missing) if missing.is_empty() => CommandResult::success(
                COMMAND,
                format!("schema is up to date at `{}`", store.path().display()),
            ),
            Ok(missing) => CommandResult::failure(
                COMMAND,
                "migration",
                format!("schema objects missing after migration: {}", missing.join(", ")),
                crate::commands::EXIT_STORE,
            ),
            Err(error) => store_failure(COMMAND, &error),
        }
    })
}

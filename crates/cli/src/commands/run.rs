use std::sync::Arc;

use serde_json::{json, Value};
use stockpilot_agent::{HttpLlmClient, LlmClient, PipelineRunner};
use stockpilot_core::config::{AppConfig, LoadOptions};
use stockpilot_core::errors::ApplicationError;
use stockpilot_core::pipeline::PipelineContext;
use stockpilot_db::seed_if_empty;

use crate::commands::{
    application_failure, build_runtime, load_config, open_store, store_failure, CommandResult,
};

const COMMAND: &str = "run";

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let llm = match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => client,
        Err(error) => {
            let error = ApplicationError::Configuration(format!("{error:#}"));
            return application_failure(COMMAND, &error, None);
        }
    };
    run_with_client(&config, Arc::new(llm))
}

/// One pipeline run against the configured store. The demo catalog is
/// loaded first when the products table is empty.
pub fn run_with_client(config: &AppConfig, llm: Arc<dyn LlmClient>) -> CommandResult {
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let store = match open_store(COMMAND, config).await {
            Ok(store) => store,
            Err(result) => return result,
        };
        if let Err(error) = seed_if_empty(&store).await {
            return store_failure(COMMAND, &error);
        }

        let runner = PipelineRunner::new(llm, store, config);
        match runner.run().await {
            Ok(context) => {
                let message = summarize(&context);
                CommandResult::success_with_data(COMMAND, message, run_payload(&context))
            }
            Err(error) => {
                let partial = error.context().map(run_payload);
                application_failure(COMMAND, &ApplicationError::from(error), partial)
            }
        }
    })
}

fn summarize(context: &PipelineContext) -> String {
    match &context.result {
        Some(result) => format!(
            "run {} completed: {} emails sent, {} prices updated, {} errors",
            context.run_id,
            result.emails_sent.len(),
            result.prices_updated.len(),
            result.errors.len()
        ),
        None => format!("run {} completed without an execution result", context.run_id),
    }
}

fn run_payload(context: &PipelineContext) -> Value {
    json!({
        "run_id": context.run_id,
        "state": context.state,
        "report": context.report,
        "decisions": context.decisions,
        "result": context.result,
        "failure": context.failure,
    })
}

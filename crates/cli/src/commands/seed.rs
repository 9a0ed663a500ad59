use stockpilot_core::config::LoadOptions;
use stockpilot_db::{seed_if_empty, SeedReport};

use crate::commands::{build_runtime, load_config, open_store, store_failure, CommandResult};

const COMMAND: &str = "seed";

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
        let store = match open_store(COMMAND, &config).await {
            Ok(store) => store,
            Err(result) => return result,
        };
        match seed_if_empty(&store).await {
            Ok(report) => CommandResult::success(COMMAND, describe(&report)),
            Err(error) => store_failure(COMMAND, &error),
        }
    })
}

fn describe(report: &SeedReport) -> String {
    if report.skipped() {
        format!(
            "products table already holds {} rows; demo catalog not loaded",
            report.existing_products
        )
    } else {
        format!(
            "loaded {} demo products: {}",
            report.inserted.len(),
            report.inserted.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use stockpilot_db::SeedReport;

    use super::describe;

    #[test]
    fn message_lists_inserted_skus() {
        let report = SeedReport {
            existing_products: 0,
            inserted: vec!["widget_a".to_string(), "widget_b".to_string()],
        };

        assert_eq!(describe(&report), "loaded 2 demo products: widget_a, widget_b");
    }

    #[test]
    fn message_explains_skipped_seed() {
        let report = SeedReport { existing_products: 7, inserted: Vec::new() };

        assert_eq!(describe(&report), "products table already holds 7 rows; demo catalog not loaded");
    }
}

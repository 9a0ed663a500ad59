pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stockpilot_core::config::LoadOptions;

use crate::commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "stockpilot",
    about = "Stockpilot inventory pipeline CLI",
    long_about = "Run the analyst, strategist and execution stages against the ERP store, \
                  and operate the store and tools directly.",
    after_help = "Examples:\n  stockpilot run\n  stockpilot doctor --json\n  stockpilot tool competitor_prices widget_a\n  stockpilot tool erp_database '{\"query\": \"SELECT sku, stock_quantity FROM products\"}'"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (defaults to stockpilot.toml or config/stockpilot.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the three-stage pipeline once (default)")]
    Run,
    #[command(about = "Apply pending store migrations and verify the schema")]
    Migrate,
    #[command(about = "Load the demo product catalog into an empty store")]
    Seed,
    #[command(about = "Check configuration, LLM credentials, store schema and email transport")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Invoke one tool with a JSON (or plain string) input")]
    Tool {
        #[arg(help = "erp_database, competitor_prices or supplier_email")]
        name: String,
        #[arg(help = "Tool input")]
        input: String,
    },
}

impl Cli {
    /// An explicit `--config` path must exist; the default locations are optional.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            ..LoadOptions::default()
        }
    }
}

pub fn execute(cli: Cli) -> CommandResult {
    let options = cli.load_options();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::run::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Tool { name, input } => commands::tool::run(&options, &name, &input),
    }
}

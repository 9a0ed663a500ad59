use std::process::ExitCode;

use clap::Parser;
use stockpilot_cli::Cli;
use stockpilot_core::config::{AppConfig, LogFormat};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.trim().to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // stdout carries the command envelope; logs go to stderr.
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Config errors are reported by the command itself.
    if let Ok(config) = AppConfig::load(cli.load_options()) {
        init_logging(&config);
    }

    let result = stockpilot_cli::execute(cli);
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

mod cli;
mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use tracing::info;

use chainctl_core::logging::init_logging;
use chainctl_core::{ChainConfig, ChainError, ConfigPaths};

use crate::cli::Cli;
use crate::context::CommandContext;
use crate::output::Reporter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let json = std::env::args().any(|arg| arg == "--json");
            Reporter::new(json).error(&anyhow::anyhow!(usage_error_message(&e)));
            return ExitCode::FAILURE;
        }
    };
    let reporter = Reporter::new(cli.global.json);

    match run(cli, reporter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            reporter.error(&e);
            ExitCode::FAILURE
        }
    }
}

/// A clap usage error on one line, without its `error: ` prefix or the
/// trailing usage block.
fn usage_error_message(err: &clap::Error) -> String {
    if err.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
        return "missing subcommand (see --help)".into();
    }
    let rendered = err.to_string();
    rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches("error: ")
        .to_string()
}

async fn run(cli: Cli, reporter: Reporter) -> Result<()> {
    let config = ChainConfig::load()?;
    let paths = ConfigPaths::resolve(&config)?;
    paths.ensure_root()?;

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = match init_logging(
        &paths.logs_dir(),
        cli.global.verbose,
        config.log_filter.as_deref(),
    ) {
        Ok(guard) => Some(guard),
        Err(e) => {
            reporter.warn(&format!("file logging disabled: {e:#}"));
            None
        }
    };
    info!(version = env!("CARGO_PKG_VERSION"), "chainctl starting");

    let result = execute(cli, config, paths).await;
    if let Err(e) = &result {
        match e.downcast_ref::<ChainError>() {
            Some(chain) => info!(category = ?chain.category(), error = %chain, "command failed"),
            None => info!(error = %format!("{e:#}"), "command failed"),
        }
    }
    result
}

async fn execute(cli: Cli, config: ChainConfig, paths: ConfigPaths) -> Result<()> {
    let ctx = CommandContext::build(&cli.global, config, paths).await?;
    commands::dispatch(&ctx, cli.command).await
}

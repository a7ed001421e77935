//! Recipe harvester binary
//!
//! Loads configuration, runs one harvest and writes the results.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};

use recipe_harvester::crawling::HarvestOrchestrator;
use recipe_harvester::infrastructure::config::AppConfig;
use recipe_harvester::infrastructure::export::{render_summary, save_recipes, save_stats};
use recipe_harvester::infrastructure::logging::{init_logging_with_config, log_system_info};

enum Command {
    Run { config_path: Option<PathBuf> },
    Help,
    Version,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--config <path>]\n\n\
         Harvests recipes from the configured category listings.\n\n\
         Options:\n  \
         -c, --config <path>  Configuration file (TOML, JSON or YAML)\n  \
         -h, --help           Show this help\n  \
         -V, --version        Show the version"
    )
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("{arg} requires a path argument"))?;
                config_path = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config_path = Some(PathBuf::from(path));
                } else {
                    return Err(anyhow!("unexpected argument: {other}"));
                }
            }
        }
    }
    Ok(Command::Run { config_path })
}

async fn harvest(config: AppConfig) -> Result<bool> {
    let output = config.output.clone();
    let orchestrator = HarvestOrchestrator::from_config(config)?;
    let report = orchestrator.run().await?;

    save_recipes(&output.output_path, &report.recipes)
        .await
        .context("Failed to save harvested recipes")?;
    if let Some(stats_path) = &output.stats_path {
        save_stats(stats_path, &report)
            .await
            .context("Failed to save run statistics")?;
    }

    let summary = render_summary(&report);
    println!("{summary}");
    info!("\n{}", summary);

    if !report.is_clean() {
        warn!("⚠️ {} tasks ended abnormally", report.task_failures.len());
    }
    Ok(report.is_clean())
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let config_path = match parse_args(args) {
        Ok(Command::Run { config_path }) => config_path,
        Ok(Command::Help) => {
            println!("{}", usage(&program));
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{program}: {e}\n\n{}", usage(&program));
            return ExitCode::from(2);
        }
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{program}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging_with_config(&config.logging) {
        eprintln!("{program}: failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }
    log_system_info();

    match harvest(config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("❌ Harvest failed: {:#}", e);
            for cause in e.chain().skip(1) {
                error!("   caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

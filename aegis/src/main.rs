//! Aegis - real-time alert triage and dispatch
//!
//! CLI entry point for the command-center coordinator.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use eyre::{Context, Result};
use tracing::info;

use aegis::cli::{Cli, Command, OutputFormat, get_log_path};
use aegis::config::Config;
use aegis::console::Console;
use aegis::coordinator::Coordinator;
use aegis::feed::SseFeedSource;
use aegis::geo::HeadlessMapProvider;
use aegis::risk::{HttpRiskClient, RiskClient};
use aegis::store::{HttpRecordStore, MemoryStore};

fn setup_logging(level: &str) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, never stdout: the console owns the terminal
    let level: tracing::Level = level.parse().unwrap_or(tracing::Level::INFO);
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .clone()
        .or_else(|| Config::load_log_level(cli.config.as_ref()))
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "Aegis loaded config: risk={}, store={}",
        config.risk.base_url, config.store.base_url
    );

    match cli.command {
        Some(Command::Run { demo }) => cmd_run(&config, demo).await,
        Some(Command::Config { format }) => cmd_config(&config, format),
        Some(Command::Check) => cmd_check(&config),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Print the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Validate the configuration
fn cmd_check(config: &Config) -> Result<()> {
    config.validate()?;
    println!("Configuration OK");
    println!("  Risk service: {}", config.risk.base_url);
    println!("  Record store: {}", config.store.base_url);
    println!("  Feed:         {}{}", config.store.base_url, config.store.feed_path);
    Ok(())
}

/// Start the coordinator and the operator console
async fn cmd_run(config: &Config, demo: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    info!(demo, "Aegis starting...");

    let risk: Arc<dyn RiskClient> =
        Arc::new(HttpRiskClient::from_config(&config.risk).context("Failed to create risk client")?);
    let map = HeadlessMapProvider::new();

    let coordinator = if demo {
        let store = Arc::new(MemoryStore::demo());
        let mut coordinator =
            Coordinator::new(config, store.clone(), risk, &map).context("Failed to acquire map")?;
        coordinator.attach_feed(store.clone(), store, &config.feed);
        println!("Demo mode: using a seeded in-memory store");
        coordinator
    } else {
        let store = Arc::new(HttpRecordStore::from_config(&config.store).context("Failed to create store client")?);
        let feed = Arc::new(SseFeedSource::from_config(&config.store));
        let mut coordinator =
            Coordinator::new(config, store.clone(), risk, &map).context("Failed to acquire map")?;
        coordinator.attach_feed(feed, store, &config.feed);
        coordinator
    };

    let handle = coordinator.handle();
    let coord_task = tokio::spawn(coordinator.run());
    info!("Coordinator started");

    let result = Console::new(handle.clone()).run().await;

    info!("Aegis shutting down...");
    let _ = handle.shutdown().await;
    let _ = coord_task.await;

    result
}

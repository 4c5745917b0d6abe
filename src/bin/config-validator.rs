//! # Gateway Configuration Validator
//!
//! Command-line tool for validating gateway configuration across environments.
//! Helps identify configuration issues before the REST layer starts the engine.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use resolver_gateway::config::{ConfigManager, GatewayConfig};
use resolver_gateway::engine::EngineCapability;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate resolver gateway configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: $GATEWAY_CONFIG_DIR or config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate all configuration sections
    All,

    /// Validate one configuration section
    Component {
        /// Section name (engine, reconciler, staleness, bulk, dispatch)
        name: String,
    },

    /// List environments that have an override file
    Environments,

    /// Print the fully resolved configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Environments) => list_environments(&cli),
        Some(Commands::Show) => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for '{}'", cli.environment))
}

fn validate_all_config(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating Gateway Configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli)?;
    println!(
        "Config Directory: {}",
        manager.config_directory().display()
    );
    println!("✅ Configuration loaded and validated");

    if cli.format == "json" {
        println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        return Ok(());
    }

    let config = manager.config();
    validate_engine_config(config);
    validate_reconciler_config(config);
    validate_staleness_config(config);
    validate_bulk_config(config);
    validate_dispatch_config(config);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> anyhow::Result<()> {
    println!("🔧 Validating Component: {component_name}");

    let manager = load(cli)?;
    let config = manager.config();

    match component_name.to_lowercase().as_str() {
        "engine" => validate_engine_config(config),
        "reconciler" => validate_reconciler_config(config),
        "staleness" => validate_staleness_config(config),
        "bulk" => validate_bulk_config(config),
        "dispatch" => validate_dispatch_config(config),
        _ => bail!("Unknown component: {component_name}"),
    }

    println!("✅ Component '{component_name}' validation passed!");
    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    let dir = manager.config_directory();
    println!("📋 Environments in {}:", dir.display());

    if !dir.exists() {
        println!("❌ Configuration directory not found");
        return Ok(());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(env) = name
            .strip_prefix("gateway.")
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(env.to_string());
        }
    }
    environments.sort();

    for env in environments {
        println!("  • {env}");
    }
    Ok(())
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

// Section summaries

fn validate_engine_config(config: &GatewayConfig) {
    println!("⚙️  Engine");
    println!("   ✅ Name: {}", config.engine.name);
    println!("   ✅ Executor slots: {}", config.engine.concurrency);
}

fn validate_reconciler_config(config: &GatewayConfig) {
    println!("🔄 Reconciler");
    if config.reconciler.enabled {
        println!(
            "   ✅ Period: {}s, gives up after {} consecutive failures",
            config.reconciler.period_seconds, config.reconciler.max_consecutive_failures
        );
    } else {
        println!("   ℹ️  Background reconciliation disabled");
    }
}

fn validate_staleness_config(config: &GatewayConfig) {
    println!("🛡️  Staleness monitor");
    println!(
        "   ✅ Check cache window: {}ms",
        config.staleness.check_cache_window_ms
    );
}

fn validate_bulk_config(config: &GatewayConfig) {
    println!("📦 Bulk ingest");
    println!("   ✅ Outstanding calls per job: {}", config.bulk.concurrency);
    if config.bulk.max_failures < 0 {
        println!("   ℹ️  No failure threshold");
    } else {
        println!("   ✅ Aborts after {} failures", config.bulk.max_failures);
    }
    if config.bulk.concurrency > config.engine.concurrency {
        warn!(
            bulk = config.bulk.concurrency,
            engine = config.engine.concurrency,
            "Bulk concurrency exceeds executor slots; extra calls will queue"
        );
    }
}

fn validate_dispatch_config(config: &GatewayConfig) {
    println!("📬 Dispatch workers");
    for worker in &config.dispatch.workers {
        let capabilities: Vec<&str> = worker.capabilities.iter().map(|c| c.name()).collect();
        println!("   • worker {}: {}", worker.worker_id, capabilities.join(", "));
    }
    for capability in [
        EngineCapability::Resolver,
        EngineCapability::Auditor,
        EngineCapability::Query,
    ] {
        if !config.dispatch.workers.iter().any(|w| w.serves(capability)) {
            println!("   ⚠️  No worker serves '{}'", capability.name());
        }
    }
}

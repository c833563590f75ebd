//! # Resilience Configuration Validator
//!
//! Command-line tool for validating the resilience configuration across
//! environments and showing the effective breaker and retry settings.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use concierge_resilience::config::{ConfigManager, ResilienceConfig, KNOWN_ENVIRONMENTS};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "resilience-config")]
#[command(about = "Validate and inspect resilience configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to resolve (development, test, production)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration for one or every known environment
    Validate {
        /// Validate every known environment instead of just the selected one
        #[arg(long)]
        all: bool,
    },

    /// Show the effective configuration
    Show,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
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
        Some(Commands::Validate { all: true }) => validate_all_environments(&cli),
        Some(Commands::Validate { all: false }) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration check completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration check failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli, environment: &str) -> anyhow::Result<Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))
}

fn selected_environment(cli: &Cli) -> String {
    cli.environment
        .as_deref()
        .map(|env| env.trim().to_lowercase())
        .unwrap_or_else(ConfigManager::detect_environment)
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let environment = selected_environment(cli);
    println!("🔧 Validating resilience configuration");
    println!("Environment: {environment}");

    let manager = load(cli, &environment)?;
    if let Some(dir) = manager.config_directory() {
        println!("Config Directory: {}", dir.display());
    }
    println!();

    print_summary(manager.config());
    println!("\n🎉 Configuration is valid");
    Ok(())
}

fn validate_all_environments(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating resilience configuration for all environments\n");

    let mut failures = Vec::new();
    for environment in KNOWN_ENVIRONMENTS {
        match load(cli, environment) {
            Ok(_) => println!("  ✅ {environment}"),
            Err(e) => {
                println!("  ❌ {environment}: {e:#}");
                failures.push(environment);
            }
        }
    }

    if failures.is_empty() {
        println!("\n🎉 All environments are valid");
        Ok(())
    } else {
        anyhow::bail!("invalid configuration for: {}", failures.join(", "))
    }
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let environment = selected_environment(cli);
    let manager = load(cli, &environment)?;

    match cli.format {
        OutputFormat::Table => print_summary(manager.config()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(manager.config())?),
    }

    Ok(())
}

fn print_summary(config: &ResilienceConfig) {
    let breakers = &config.circuit_breakers;

    println!("⚡ Circuit Breakers");
    println!("   Enabled: {}", breakers.enabled);
    println!(
        "   Max breakers: {} (soft limit)",
        breakers.global_settings.max_circuit_breakers
    );
    println!(
        "   Response time window: {}",
        breakers.global_settings.response_time_window
    );
    println!();
    println!(
        "   {:<20} {:>9} {:>12} {:>9} {:>12}",
        "component", "failures", "recovery(s)", "successes", "timeout(s)"
    );

    let mut components: Vec<_> = breakers.component_configs.iter().collect();
    components.sort_by(|a, b| a.0.cmp(b.0));
    let default_row = ("(default)".to_string(), &breakers.default_config);

    for (name, component) in std::iter::once((&default_row.0, default_row.1)).chain(components) {
        println!(
            "   {:<20} {:>9} {:>12} {:>9} {:>12}",
            name,
            component.failure_threshold,
            component.recovery_timeout_seconds,
            component.success_threshold,
            component.call_timeout_seconds
        );
    }

    println!("\n🔁 Retry");
    let retry = &config.retry;
    println!(
        "   Default: {} attempts, base {}s, max {}s, factor {}, jitter {}, accounting {:?}",
        retry.max_attempts,
        retry.base_delay_seconds,
        retry.max_delay_seconds,
        retry.backoff_factor,
        retry.jitter,
        retry.accounting
    );

    let mut services: Vec<_> = config
        .services
        .iter()
        .filter_map(|(name, service)| service.retry.as_ref().map(|retry| (name, retry)))
        .collect();
    services.sort_by(|a, b| a.0.cmp(b.0));

    for (name, retry) in services {
        println!(
            "   {name}: {} attempts, base {}s, max {}s, factor {}, jitter {}, accounting {:?}",
            retry.max_attempts,
            retry.base_delay_seconds,
            retry.max_delay_seconds,
            retry.backoff_factor,
            retry.jitter,
            retry.accounting
        );
    }
}

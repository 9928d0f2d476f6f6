//! Event tracker CLI
//!
//! Watches an events page and emails newly listed events.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use event_tracker::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, CycleController},
    services::{EmailNotifier, EventCrawler},
    storage::LocalStorage,
};

/// Event tracker - new event notifications for an events page
#[derive(Parser, Debug)]
#[command(
    name = "event-tracker",
    version,
    about = "Watch an events page and email new events"
)]
struct Cli {
    /// Path to the configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// State file path (default: storage.events_file from the config)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the page repeatedly until interrupted
    Watch {
        /// Minutes between checks (default: check_interval_minutes)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Run a single check and exit
    Once,

    /// Validate the configuration
    Validate,

    /// Show state file info
    Info,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the config file and apply environment overrides.
fn load_config(path: &Path) -> Config {
    let mut config = Config::load_or_default(path);
    config.apply_env();
    config
}

/// Validate the config and report its warnings.
fn check_config(config: &Config) -> Result<()> {
    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    for warning in config.warnings() {
        log::warn!("{}", warning);
    }
    Ok(())
}

fn build_controller(config: &Config, store_path: PathBuf) -> Result<CycleController> {
    let source = EventCrawler::new(config.source.clone())?;
    let store = LocalStorage::new(store_path);
    let notifier = EmailNotifier::new(config.email.clone(), config.source.clone());

    Ok(CycleController::new(
        config,
        Arc::new(source),
        Arc::new(store),
        Arc::new(notifier),
    ))
}

/// Write a default config file.
fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        log::warn!(
            "Config already exists at {}. Use --force to overwrite.",
            path.display()
        );
        return Ok(());
    }
    Config::default().save(path)?;
    log::info!("Default configuration written to {}", path.display());
    log::info!("Edit the email section before running the tracker");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let load = || {
        let config = load_config(&cli.config);
        let store_path = cli
            .store
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.storage.events_file));
        (config, store_path)
    };

    match cli.command {
        Command::Init { force } => init_config(&cli.config, force)?,

        Command::Watch { interval } => {
            let (config, store_path) = load();
            check_config(&config)?;
            let minutes = interval.unwrap_or(config.check_interval_minutes);
            if minutes == 0 {
                return Err(AppError::validation("--interval must be > 0"));
            }

            log::info!("Event tracker starting...");
            log::info!("Monitoring: {}", config.source.url);
            log::info!("State file: {}", store_path.display());

            let mut controller = build_controller(&config, store_path)?;
            let stop = pipeline::ctrl_c_signal();
            let interval = pipeline::interval_from_minutes(minutes);
            pipeline::run_continuous(&mut controller, interval, stop).await;
        }

        Command::Once => {
            let (config, store_path) = load();
            check_config(&config)?;
            let mut controller = build_controller(&config, store_path)?;
            pipeline::run_once(&mut controller).await?;
        }

        Command::Validate => {
            let (config, _) = load();
            log::info!("Validating configuration...");
            check_config(&config)?;
            log::info!("✓ Source: {} ({})", config.source.name, config.source.url);
            log::info!(
                "✓ Email: {} via {}:{}, {} recipient(s)",
                config.email.sender_email,
                config.email.smtp_server,
                config.email.smtp_port,
                config.email.recipients.len()
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            let (_, store_path) = load();
            let info = LocalStorage::new(store_path).info().await?;
            log::info!("State file: {}", info.location);
            if !info.exists {
                log::info!("No state yet. The first check will announce every event.");
                return Ok(());
            }

            log::info!("Known events: {}", info.count);
            match info.updated_at {
                Some(at) => log::info!("Updated at: {}", at.to_rfc3339()),
                None => log::info!("Updated at: unknown"),
            }
            if info.legacy {
                log::info!("Layout: legacy list (rewritten on next save)");
            }
        }
    }

    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

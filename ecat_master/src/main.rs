//! # EtherCAT Master Binary
//!
//! Runs the cyclic exchange with the configured joints once the safety
//! supervisor sets its enable flag.
//!
//! # Usage
//!
//! ```bash
//! # Simulated bus, default configuration
//! ecat_master --driver simulation
//!
//! # Production configuration, fail if RT setup is incomplete
//! ecat_master --config /etc/ecat/master.toml --strict-rt
//!
//! # Show the effective configuration
//! ecat_master --joints 4 --print-config
//! ```

use clap::Parser;
use ecat_common::config::{ConfigError, ConfigLoader, MasterConfig};
use ecat_common::consts::DEFAULT_CONFIG_PATH;
use ecat_master::driver_registry::DriverRegistry;
use ecat_master::{RunError, ShutdownController};
use std::path::PathBuf;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// EtherCAT master for servo joints
#[derive(Parser, Debug)]
#[command(name = "ecat_master")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Cyclic EtherCAT master for servo joints, gated by a safety supervisor")]
#[command(long_about = None)]
struct Args {
    /// Path to the master configuration file (master.toml).
    /// Defaults are used if it does not exist.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Fieldbus driver (overrides bus.driver)
    #[arg(short, long)]
    driver: Option<String>,

    /// Number of joints (overrides bus.joint_count)
    #[arg(short, long)]
    joints: Option<usize>,

    /// CPU core of the cyclic thread (overrides rt.cpu_core)
    #[arg(long)]
    cpu_core: Option<usize>,

    /// SCHED_FIFO priority (overrides rt.priority)
    #[arg(long)]
    rt_priority: Option<i32>,

    /// Treat any failed real-time setup step as fatal
    #[arg(long)]
    strict_rt: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(&args, &MasterConfig::default());
            error!("Configuration rejected: {}", e);
            std::process::exit(1);
        }
    };

    if args.print_config {
        match toml::to_string(&config) {
            Ok(text) => print!("{text}"),
            Err(e) => {
                eprintln!("Failed to serialize configuration: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    setup_tracing(&args, &config);
    if !args.config.exists() {
        warn!("Config file {} not found, using defaults", args.config.display());
    }
    if let Err(e) = run(&args, &config) {
        error!("Master failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &MasterConfig) -> Result<(), RunError> {
    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let registry = DriverRegistry::with_builtin_drivers()?;
    let driver = registry.create_driver(&config.bus.driver)?;
    info!(
        driver = driver.name(),
        joints = config.bus.joint_count,
        cycle_us = config.bus.cycle_time_us,
        "Configuration loaded from {}",
        args.config.display()
    );

    let shutdown = ShutdownController::new();
    if let Err(e) = shutdown.install_signal_handler() {
        warn!("Failed to install signal handler: {e}");
    }

    let summary = ecat_master::run(config, driver, &shutdown)?;
    if !summary.rt.fully_applied() {
        warn!("Ran without complete real-time setup");
    }
    match summary.cycle {
        Some(cycle) => info!(cycles = cycle.stats.cycle_count, "Shutdown complete"),
        None => info!("Shutdown before the supervisor enabled the cycle"),
    }
    Ok(())
}

/// Load the configuration file, apply CLI overrides and validate.
fn load_config(args: &Args) -> Result<MasterConfig, ConfigError> {
    let mut config = match MasterConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) => MasterConfig::default(),
        Err(e) => return Err(e),
    };

    if let Some(driver) = &args.driver {
        config.bus.driver = driver.clone();
    }
    if let Some(joints) = args.joints {
        config.bus.joint_count = joints;
    }
    if let Some(core) = args.cpu_core {
        config.rt.cpu_core = core;
    }
    if let Some(priority) = args.rt_priority {
        config.rt.priority = priority;
    }
    if args.strict_rt {
        config.rt.strict = true;
    }

    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments and configuration.
fn setup_tracing(args: &Args, config: &MasterConfig) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.shared.log_level.into()
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

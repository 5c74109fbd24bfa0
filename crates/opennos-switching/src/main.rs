//! OpenNOS switching daemon entry point.
//!
//! Loads the configuration, brings the switching core up on the simulated
//! ASIC and runs the link-event and dispatch loop until SIGINT.

use clap::Parser;
use log::{error, info, warn};
use opennos_core::ResultCode;
use opennos_hal::SimulatedAsic;
use opennos_switching::config::DEFAULT_CONFIG_PATH;
use opennos_switching::{Switching, SwitchingConfig};
use opennos_types::PortId;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// OpenNOS switching control plane
#[derive(Parser, Debug)]
#[command(name = "opennosd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Link event wait per loop turn in milliseconds, overrides the config file
    #[arg(long)]
    link_wait_ms: Option<u64>,

    /// Ports to create at startup, overrides the config file
    #[arg(short = 'p', long, value_delimiter = ',')]
    ports: Option<Vec<u16>>,
}

fn load_config(args: &Args) -> Result<SwitchingConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = SwitchingConfig::load_or_default(&args.config)?;
    if let Some(wait) = args.link_wait_ms {
        config.runtime.link_wait_ms = wait;
    }
    if let Some(ports) = &args.ports {
        config.ports.initial = ports.iter().copied().map(PortId::new).collect();
    }
    config.validate()?;
    Ok(config)
}

fn run(config: SwitchingConfig, stop: Arc<AtomicBool>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let asic = Arc::new(SimulatedAsic::new(config.port_mapping()?));
    let wait = config.link_wait();
    let mut switching = Switching::new(asic, config);

    let report = |code: ResultCode, message: &str| {
        if code.is_success() {
            info!("initial commit: {}", message);
        } else {
            error!("initial commit: {} ({})", code.as_str(), message);
        }
    };
    switching.init(&report)?;
    info!(
        "switching core up with {} ports",
        switching.ports().ports().count()
    );

    while !stop.load(Ordering::Relaxed) {
        let turn = switching.run_once(wait);
        for (outcome, err) in turn.dispatch.failures() {
            warn!("{} on {} failed: {}", outcome.task, outcome.class, err);
        }
    }

    switching.shutdown();
    if switching.has_pending() {
        warn!("discarding uncommitted changes");
        switching.discard_pending();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    info!("starting opennosd");
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration {}: {}", args.config.display(), err);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "asic unit {}, {} ports, link wait {}ms",
        config.asic.unit, config.asic.max_ports, config.runtime.link_wait_ms
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    let signal_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("received SIGINT, shutting down");
                stop_signal.store(true, Ordering::Relaxed);
            }
            Err(err) => error!("failed to listen for ctrl-c: {}", err),
        }
    });

    // the controllers are single-threaded, so the loop owns a blocking thread
    let result = tokio::task::spawn_blocking(move || run(config, stop)).await;
    signal_handle.abort();

    match result {
        Ok(Ok(())) => {
            info!("opennosd stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            error!("opennosd failed: {}", err);
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("switching loop panicked: {}", err);
            ExitCode::FAILURE
        }
    }
}

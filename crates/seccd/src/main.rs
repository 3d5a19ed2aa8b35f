//! seccd - Charging-station session daemon
//!
//! Runs the vehicle-facing protocol engine: link discovery, one charging
//! session at a time, feedback to the log.
//!
//! # Usage
//!
//! ```bash
//! seccd                       # defaults, plaintext, eth0
//! seccd --config seccd.toml   # TOML configuration
//! RUST_LOG=secc_v2g=debug seccd -v
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use secc_core::{
    DcChargeTarget, DcTransferLimits, DisplayParameters, Feedback, SignalEvent,
};
use secc_v2g::{Controller, EngineConfig, JsonCodec};

#[derive(Parser, Debug)]
#[command(name = "seccd")]
#[command(about = "Charging-station session daemon")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Feedback sink that reports everything to the log. A real deployment
/// forwards these into the station control system instead.
struct LogFeedback;

impl Feedback for LogFeedback {
    fn signal(&self, event: SignalEvent) {
        info!(?event, "session signal");
    }

    fn dc_charge_target(&self, target: DcChargeTarget) {
        info!(
            voltage = target.voltage,
            current = target.current,
            "charge target"
        );
    }

    fn dc_max_limits(&self, limits: DcTransferLimits) {
        info!(
            max_voltage = limits.max_voltage,
            max_current = limits.max_current,
            max_power = limits.max_power,
            "negotiated limits"
        );
    }

    fn evcc_id(&self, id: &str) {
        info!(evcc_id = id, "vehicle identified");
    }

    fn selected_protocol(&self, protocol: &str) {
        info!(protocol, "protocol selected");
    }

    fn display_parameters(&self, params: DisplayParameters) {
        info!(?params, "vehicle display parameters");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "seccd=debug,secc_v2g=debug,secc_core=debug"
    } else {
        "seccd=info,secc_v2g=info,secc_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting seccd");

    let config = match &args.config {
        Some(path) => {
            EngineConfig::from_file(path).with_context(|| format!("loading {path}"))?
        }
        None => {
            info!("no configuration file given, using defaults");
            EngineConfig::default()
        }
    };

    let controller = Controller::bind(config, Arc::new(JsonCodec), Arc::new(LogFeedback))
        .await
        .context("binding the engine endpoints")?;
    let handle = controller.handle();

    let _signal_task = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "signal handler failed");
            return;
        }
        info!("interrupt received, aborting");
        handle.abort();
    });

    controller.run().await.context("engine loop failed")?;
    info!("seccd stopped");
    Ok(())
}

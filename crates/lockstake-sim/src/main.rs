//! lockstake-sim: drives the reward engine through a seeded scenario.
//!
//! Loads a TOML config, simulates one epoch per day and prints a JSON
//! report of escrow, payouts and burns on exit.

mod config;
mod scenario;

use std::time::Duration;

use tracing::{error, info};

use crate::config::SimConfig;
use crate::scenario::Simulation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("lockstake={}", config.logging.log_level).parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("lockstake simulator starting");

    let mut sim = Simulation::new(&config)?;
    let mut ticker = tokio::time::interval(Duration::from_millis(config.scenario.tick_ms.max(1)));

    while !sim.is_done() {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sim.step() {
                    error!("simulation aborted: {}", e);
                    return Err(e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, stopping early");
                break;
            }
        }
    }

    let report = sim.report();
    if !report.is_conserved() {
        error!(
            escrowed = report.escrowed,
            paid = report.paid,
            burned = report.burned_escrow,
            pending = report.pending_escrow,
            "escrow is not conserved"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(days = report.days, "lockstake simulator stopped");
    Ok(())
}

use anyhow::Result;
use powerlimiter::clock::{Clock, SystemClock};
use powerlimiter::limiter::{LimiterCommand, PowerLimiter};
use powerlimiter::logging::init_logging;
use powerlimiter::sim::SimulatedSite;
use powerlimiter::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

// Limiter and simulated site must not run in parallel: every tick reads
// the site as one consistent snapshot
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load_from(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Dynamic power limiter {} starting up", env!("APP_VERSION"));

    if !config.simulation.enabled {
        anyhow::bail!("No device drivers available; set simulation.enabled to run the limiter");
    }

    match config.inverter(config.power_limiter.inverter_id) {
        Some(inv) => info!(
            "Managing inverter {} ({}, {} W)",
            inv.name, inv.serial, inv.max_power
        ),
        None => warn!(
            "Inverter {} is not configured, the limiter will stay idle",
            config.power_limiter.inverter_id
        ),
    }

    let tz = config.tz().map_err(|e| anyhow::anyhow!("{}", e))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(tz));
    let site = SimulatedSite::new(&config, Arc::clone(&clock));
    let sources = site.sources();

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<LimiterCommand>();
    let mut limiter = PowerLimiter::new(Arc::new(config.clone()), sources, cmd_rx);
    let shutdown_tx = limiter.shutdown_sender();

    // Simulated hardware advances on the scheduler tick as well
    let sim_task = tokio::spawn(site.run(Duration::from_millis(config.poll_interval_ms)));

    // `<topic> <payload>` lines on stdin, e.g. `upper_power_limit 600`
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some((topic, payload)) = line.trim().split_once(char::is_whitespace) else {
                continue;
            };
            match LimiterCommand::parse(topic, payload) {
                Ok(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring command: {}", e),
            }
        }
    });

    // Full snapshot on every status change, for log based monitoring
    let mut snapshots = limiter.subscribe();
    let snapshot_task = tokio::spawn(async move {
        let mut last_status = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            if last_status == Some(snapshot.status) {
                continue;
            }
            last_status = Some(snapshot.status);
            match serde_json::to_string(&*snapshot) {
                Ok(json) => debug!("snapshot {}", json),
                Err(e) => warn!("Failed to serialize snapshot: {}", e),
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            let _ = shutdown_tx.send(());
        }
    });

    let result = limiter.run().await;
    sim_task.abort();
    stdin_task.abort();
    snapshot_task.abort();

    match result {
        Ok(()) => {
            info!("Power limiter shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Power limiter failed with error: {}", e);
            Err(anyhow::anyhow!("Power limiter error: {}", e))
        }
    }
}

//! landcase daemon: runs the case orchestrator's background scheduler until
//! ctrl-c.

use anyhow::{Context, Result};
use lc_core::config::Config;
use lc_daemon::daemon::Daemon;
use lc_telemetry::logging::{self, LogFormat};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    logging::init(
        "lc-daemon",
        &config.general.log_level,
        LogFormat::from_json_flag(config.general.json_logs),
    );
    if let Some(e) = load_error {
        warn!(
            error = %e,
            path = %Config::default_path().display(),
            "failed to load config, using defaults"
        );
    }

    info!(project = %config.general.project_name, "landcase daemon starting");

    let daemon = Daemon::new(config);
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run().await.context("scheduler loop failed")?;

    let status = daemon.status();
    info!(
        sweeps = status.sweep_count,
        summaries = status.summary_count,
        "landcase daemon stopped"
    );
    Ok(())
}

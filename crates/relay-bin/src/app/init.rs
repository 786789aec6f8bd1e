//! Relay initialization.

use crate::adapters::load_channel_store;
use crate::app::lifecycle::{process_alive, read_pid};
use crate::app::supervisor::spawn_shard_supervisor;
use crate::app::RelayState;
use relay_config_and_utils::{Config, Paths};
use relay_ports::ChannelRepository;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Run the relay until SIGINT or SIGTERM.
pub async fn run_relay(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    // Singleton enforcement through the pid file
    let pid_file = paths.pid_file();
    if let Some(pid) = read_pid(&pid_file) {
        if process_alive(pid) {
            eprintln!(
                "Error: Relay is already running (PID {}). Use 'signal-relay stop' to stop it first.",
                pid
            );
            std::process::exit(1);
        }
        eprintln!("Removing stale PID file");
    }
    if pid_file.exists() {
        let _ = std::fs::remove_file(&pid_file);
    }

    info!(
        shard_count = config.shard_count,
        pool_size = config.pool_size,
        socket_dir = %config.socket_dir.display(),
        "Starting signal relay"
    );

    paths.ensure_dirs()?;

    let pid = std::process::id();
    std::fs::write(&pid_file, pid.to_string())?;
    info!(pid = pid, "Relay started");

    let result = serve(config, &paths).await;

    // Cleanup
    let _ = std::fs::remove_file(&pid_file);
    info!("Relay stopped");

    result
}

async fn serve(config: Config, paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(load_channel_store(&paths.channels_file(), &config)?);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let state = RelayState::build(config, store, events_tx);

    // A shard that cannot be reached at startup aborts the relay.
    if let Err(e) = state.connect_all().await {
        state.shutdown();
        return Err(format!("Failed to connect shards: {}", e).into());
    }

    for shard in state.shards() {
        let subscribed = state.subscribe_shard(shard).await;
        match state.api.version(shard).await {
            Ok(version) => info!(shard = %shard, version = %version, subscribed, "Shard ready"),
            Err(e) => warn!(shard = %shard, error = %e, subscribed, "Shard did not report a version"),
        }
    }

    if let Some(relay_number) = state.config.relay_number.clone() {
        spawn_healthchecks(state.clone(), relay_number);
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let supervisor = spawn_shard_supervisor(state.clone(), events_rx, shutdown_rx);

    let signal_result = wait_for_shutdown_signal().await;

    let _ = shutdown_tx.send(());
    if let Err(e) = supervisor.await {
        warn!(error = %e, "Shard supervisor task failed");
    }
    state.shutdown();

    signal_result.map_err(|e| e.into())
}

/// Round-trip one healthcheck per shard, from the first channel it serves to
/// the diagnostics number, in the background.
fn spawn_healthchecks(state: RelayState, relay_number: String) {
    tokio::spawn(async move {
        let channels = match state.store.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Healthcheck skipped: channels unavailable");
                return;
            }
        };
        for shard in state.shards() {
            let Some(channel) = channels
                .iter()
                .find(|c| c.shard == shard && c.phone_number != relay_number)
            else {
                continue;
            };
            if let Err(e) = state
                .api
                .healthcheck(shard, &channel.phone_number, &relay_number)
                .await
            {
                warn!(shard = %shard, channel = %channel.phone_number, error = %e, "Healthcheck failed");
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received interrupt, shutting down");
        }
        _ = terminate.recv() => {
            info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}

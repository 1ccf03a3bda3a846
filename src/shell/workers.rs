// Background workers owned by the shell.
//
// Connectivity probe
// - Pings the remote on a fixed interval and reports reachability changes to
//   the sync coordinator. Only transitions are reported.
// - Rejected credentials still prove the host is reachable.
// - Stops when the shutdown signal flips or the coordinator is gone.

use crate::modules::time_reports::adapters::outbound::remote_source::RemoteSource;
use crate::modules::time_reports::use_cases::sync_weekly_reports::handler::SyncCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub fn spawn_connectivity_probe(
    remote: Arc<dyn RemoteSource>,
    coordinator: SyncCoordinator,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_reachable: Option<bool> = None;
        loop {
            let reachable = match remote.ping().await {
                Ok(()) => true,
                Err(err) if err.is_auth() => true,
                Err(err) => {
                    debug!(error = %err, "connectivity probe failed");
                    false
                }
            };
            if last_reachable != Some(reachable) {
                info!(reachable, "connectivity changed");
                if coordinator.connectivity_changed(reachable).await.is_err() {
                    break;
                }
                last_reachable = Some(reachable);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("connectivity probe stopped");
    })
}

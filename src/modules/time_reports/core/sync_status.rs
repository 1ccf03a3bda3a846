// Sync status state machine.
//
// Purpose
// - One indicator for the whole engine: online, offline or updating.
//
// Responsibilities
// - Pure transitions. The coordinator owns the current value and feeds events.
// - While a refresh is in flight, connectivity events do not move the status;
//   the refresh outcome decides where it lands.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Online,
    #[default]
    Offline,
    Updating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    ConnectivityOnline,
    ConnectivityOffline,
    RefreshStarted,
    RefreshSucceeded,
    RefreshFailed,
}

pub fn transition(status: SyncStatus, event: SyncEvent) -> SyncStatus {
    use SyncEvent::*;
    use SyncStatus::*;
    match (status, event) {
        (Updating, ConnectivityOnline | ConnectivityOffline) => Updating,
        (_, ConnectivityOnline) => Online,
        (_, ConnectivityOffline) => Offline,
        (_, RefreshStarted) => Updating,
        (_, RefreshSucceeded) => Online,
        (_, RefreshFailed) => Offline,
    }
}

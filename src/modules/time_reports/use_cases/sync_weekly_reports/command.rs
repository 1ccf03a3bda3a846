use crate::modules::time_reports::core::settings::BillingSettings;
use crate::modules::time_reports::core::time_entry::TimeEntry;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum SyncCommand {
    /// Cache-first read, then a background refresh when online.
    Load { first_load: bool },
    /// Refresh now; joins the in-flight refresh if there is one.
    Reload,
    /// Debounced refresh, e.g. after the reader navigated between weeks.
    RequestSync,
    /// Debounced recompute from cached raw entries with new billing inputs.
    UpdateSettings(BillingSettings),
    /// Full entry snapshot pushed by the server.
    PushSnapshot(Vec<TimeEntry>),
    ConnectivityChanged { online: bool },
}

/// A command plus the channel acknowledging it was applied.
#[derive(Debug)]
pub struct Envelope {
    pub command: SyncCommand,
    pub ack: oneshot::Sender<()>,
}

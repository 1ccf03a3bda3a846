// Composition root for the time_reports bounded context.
//
// Responsibilities:
// - Read config from environment.
// - Instantiate the entity store and the remote source the config selects.
// - Wire them into the sync coordinator.
// - Spawn background workers (connectivity probe).

pub mod config;
pub mod http;
pub mod settings_file;
pub mod state;
pub mod workers;

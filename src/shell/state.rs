use crate::modules::time_reports::use_cases::sync_weekly_reports::handler::SyncCoordinator;
use crate::shell::settings_file::SettingsFile;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SyncCoordinator,
    pub settings_file: Option<Arc<SettingsFile>>,
}

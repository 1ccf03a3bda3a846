// Billing settings persisted as a JSON file next to the database.
//
// The sync core never stores billing configuration. The shell reads this
// file at startup and rewrites it whenever settings arrive over HTTP.

use crate::modules::time_reports::core::settings::BillingSettings;
use crate::shell::config::ConfigError;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, reason: impl ToString) -> ConfigError {
        ConfigError::SettingsFile {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// Defaults when the file does not exist yet.
    pub async fn load(&self) -> Result<BillingSettings, ConfigError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no settings file, using defaults");
                Ok(BillingSettings::default())
            }
            Err(e) => Err(self.error(e)),
        }
    }

    pub async fn save(&self, settings: &BillingSettings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(e))?;
        }
        let json = serde_json::to_vec_pretty(settings).map_err(|e| self.error(e))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.error(e))
    }
}

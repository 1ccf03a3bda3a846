use anyhow::Context;
use std::sync::Arc;
use time_reports::modules::time_reports::adapters::outbound::entity_store_sqlite::SqliteEntityStore;
use time_reports::modules::time_reports::adapters::outbound::remote_source::RemoteSource;
use time_reports::modules::time_reports::adapters::outbound::remote_source_http::{
    BackendProxySource, TimeTrackerApiSource,
};
use time_reports::modules::time_reports::core::settings::BillingSettings;
use time_reports::modules::time_reports::use_cases::sync_weekly_reports::handler::{
    SyncCoordinator, SyncOptions,
};
use time_reports::shell::config::{AppConfig, SourceKind};
use time_reports::shell::http::router;
use time_reports::shell::settings_file::SettingsFile;
use time_reports::shell::state::AppState;
use time_reports::shell::workers::spawn_connectivity_probe;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env().context("reading configuration")?;

    let remote: Arc<dyn RemoteSource> = match config.source {
        SourceKind::Api => Arc::new(TimeTrackerApiSource::new(
            &config.api_url,
            config.api_token.as_deref().unwrap_or_default(),
        )?),
        SourceKind::Backend => Arc::new(BackendProxySource::new(
            &config.api_url,
            config.api_token.as_deref(),
        )?),
    };
    let store = Arc::new(SqliteEntityStore::open_at(config.database_path.clone()));

    let settings_file = config.settings_path.clone().map(SettingsFile::new);
    let settings = match &settings_file {
        Some(file) => file.load().await?,
        None => BillingSettings::default(),
    };

    let coordinator = SyncCoordinator::spawn(
        store,
        Arc::clone(&remote),
        settings,
        SyncOptions {
            first_load_days: config.first_load_days,
            refresh_days: config.refresh_days,
            ..SyncOptions::default()
        },
    );
    coordinator.load(true).await?;

    let (stop_workers, shutdown) = watch::channel(false);
    let probe = spawn_connectivity_probe(
        remote,
        coordinator.clone(),
        config.probe_interval,
        shutdown,
    );

    let state = AppState {
        coordinator,
        settings_file: settings_file.map(Arc::new),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    let _ = stop_workers.send(true);
    let _ = probe.await;
    Ok(())
}

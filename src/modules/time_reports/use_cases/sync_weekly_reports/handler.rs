// Sync coordinator for the weekly reports.
//
// Purpose
// - Show the last known weeks at once, refresh them from the remote in the
//   background and keep the published result consistent while fetches,
//   pushes and settings edits interleave.
//
// Responsibilities
// - One actor task owns every piece of mutable state. Callers talk to it
//   through `SyncCoordinator` and read results from a watch channel.
// - Network fetches run in spawned tasks and report back to the actor.
//   Every fetch and push is tagged with a generation; results older than the
//   published data are dropped.
// - At most one refresh is in flight. Reload requests arriving meanwhile are
//   folded into a single follow-up refresh.
// - Store and remote failures turn into status and error state here and
//   nowhere else.

use crate::modules::time_reports::adapters::outbound::entity_store::{
    CACHED_WEEKS_SETTINGS_KEY, EntityStore, LAST_SYNC_KEY, StoreError,
};
use crate::modules::time_reports::adapters::outbound::remote_source::{
    FetchWindow, RemoteError, RemoteSource,
};
use crate::modules::time_reports::core::financials::WeekData;
use crate::modules::time_reports::core::report::{build_weekly_report, upsert_entries};
use crate::modules::time_reports::core::settings::BillingSettings;
use crate::modules::time_reports::core::sync_status::{SyncEvent, transition};
use crate::modules::time_reports::core::time_entry::{
    Activity, Project, ReferenceData, TimeEntry,
};
use crate::modules::time_reports::use_cases::sync_weekly_reports::command::{
    Envelope, SyncCommand,
};
use crate::modules::time_reports::use_cases::sync_weekly_reports::report_state::{
    CoordinatorClosed, ReportError, ReportState,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct SyncOptions {
    pub first_load_days: i64,
    pub refresh_days: i64,
    pub settings_debounce: Duration,
    pub sync_debounce: Duration,
    /// Connectivity assumed until the host reports otherwise.
    pub assume_online: bool,
    pub clock: Clock,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            first_load_days: 365,
            refresh_days: 30,
            settings_debounce: Duration::from_millis(300),
            sync_debounce: Duration::from_millis(300),
            assume_online: true,
            clock: Arc::new(Utc::now),
        }
    }
}

/// Cloneable handle to the coordinator actor.
#[derive(Clone)]
pub struct SyncCoordinator {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<ReportState>,
}

impl SyncCoordinator {
    /// Starts the actor on the current tokio runtime.
    pub fn spawn(
        store: Arc<dyn EntityStore>,
        remote: Arc<dyn RemoteSource>,
        settings: BillingSettings,
        options: SyncOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (publisher, state) = watch::channel(ReportState::default());
        let actor = Coordinator {
            online: options.assume_online,
            store,
            remote,
            settings,
            options,
            publisher,
            state: ReportState::default(),
            entries: Vec::new(),
            outcomes: outcomes_tx,
            next_generation: 0,
            published_generation: 0,
            in_flight: None,
            reload_pending: false,
            pending_settings: None,
            settings_deadline: None,
            sync_deadline: None,
        };
        tokio::spawn(actor.run(commands_rx, outcomes_rx));
        Self {
            commands: commands_tx,
            state,
        }
    }

    async fn send(&self, command: SyncCommand) -> Result<(), CoordinatorClosed> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Envelope { command, ack })
            .await
            .map_err(|_| CoordinatorClosed)?;
        done.await.map_err(|_| CoordinatorClosed)
    }

    /// Returns once cached data is published and a refresh, if any, started.
    pub async fn load(&self, first_load: bool) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::Load { first_load }).await
    }

    pub async fn reload(&self) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::Reload).await
    }

    pub async fn request_sync(&self) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::RequestSync).await
    }

    pub async fn update_settings(&self, settings: BillingSettings) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::UpdateSettings(settings)).await
    }

    pub async fn push_snapshot(&self, entries: Vec<TimeEntry>) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::PushSnapshot(entries)).await
    }

    pub async fn connectivity_changed(&self, online: bool) -> Result<(), CoordinatorClosed> {
        self.send(SyncCommand::ConnectivityChanged { online }).await
    }

    pub fn subscribe(&self) -> watch::Receiver<ReportState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> ReportState {
        self.state.borrow().clone()
    }
}

struct FetchedData {
    entries: Vec<TimeEntry>,
    projects: Option<Vec<Project>>,
    activities: Option<Vec<Activity>>,
}

struct FetchOutcome {
    generation: u64,
    result: Result<FetchedData, RemoteError>,
}

struct Coordinator {
    store: Arc<dyn EntityStore>,
    remote: Arc<dyn RemoteSource>,
    settings: BillingSettings,
    options: SyncOptions,
    publisher: watch::Sender<ReportState>,
    state: ReportState,
    /// Last known raw entries. Used whenever the store cannot be read.
    entries: Vec<TimeEntry>,
    outcomes: mpsc::UnboundedSender<FetchOutcome>,
    online: bool,
    next_generation: u64,
    published_generation: u64,
    in_flight: Option<u64>,
    reload_pending: bool,
    pending_settings: Option<BillingSettings>,
    settings_deadline: Option<Instant>,
    sync_deadline: Option<Instant>,
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Envelope>,
        mut outcomes: mpsc::UnboundedReceiver<FetchOutcome>,
    ) {
        loop {
            let deadline = match (self.settings_deadline, self.sync_deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            tokio::select! {
                envelope = commands.recv() => match envelope {
                    Some(Envelope { command, ack }) => {
                        self.handle(command).await;
                        let _ = ack.send(());
                    }
                    None => break,
                },
                Some(outcome) = outcomes.recv() => self.on_fetch_complete(outcome).await,
                _ = sleep_until_deadline(deadline) => self.fire_due_timers().await,
            }
        }
        debug!("sync coordinator stopped");
    }

    async fn handle(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::Load { first_load } => self.load(first_load).await,
            SyncCommand::Reload => self.start_refresh(false),
            SyncCommand::RequestSync => {
                self.sync_deadline = Some(Instant::now() + self.options.sync_debounce);
            }
            SyncCommand::UpdateSettings(settings) => {
                self.pending_settings = Some(settings);
                self.settings_deadline = Some(Instant::now() + self.options.settings_debounce);
            }
            SyncCommand::PushSnapshot(entries) => self.apply_push(entries).await,
            SyncCommand::ConnectivityChanged { online } => self.connectivity_changed(online),
        }
    }

    fn publish(&mut self) {
        self.state.revision += 1;
        self.publisher.send_replace(self.state.clone());
    }

    fn now(&self) -> DateTime<Utc> {
        (self.options.clock)()
    }

    fn fail_fatally(&mut self, err: StoreError) {
        error!(error = %err, "entity store unusable");
        self.state.error = Some(ReportError::Store(err.to_string()));
        self.state.loading = false;
        self.state.syncing = false;
        self.publish();
    }

    async fn load(&mut self, first_load: bool) {
        self.state.loading = true;
        self.publish();

        if first_load {
            if let Err(err) = self.store.init().await {
                self.fail_fatally(err);
                return;
            }
        }

        match self.read_cache().await {
            Ok(Some(weeks)) => {
                self.state.weeks = weeks;
                self.state.loading = false;
            }
            Ok(None) => {}
            Err(err) if err.is_fatal() => {
                self.fail_fatally(err);
                return;
            }
            Err(err) => warn!(error = %err, "cache read failed, continuing without cache"),
        }
        self.state.last_synced_at = self
            .store
            .get_metadata(LAST_SYNC_KEY)
            .await
            .ok()
            .flatten()
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc));

        if self.online {
            self.start_refresh(first_load);
        } else {
            info!("offline, serving cached weeks");
            self.state.status = transition(self.state.status, SyncEvent::ConnectivityOffline);
            self.state.loading = false;
            if self.state.weeks.is_empty() {
                self.state.error = Some(ReportError::NoCachedData("offline".into()));
            }
            self.publish();
        }
    }

    /// Materialized weeks when they were computed with the current settings,
    /// otherwise a fresh recompute from the raw entries. `None` when there is
    /// nothing cached at all.
    async fn read_cache(&mut self) -> Result<Option<Vec<WeekData>>, StoreError> {
        let cached = self.store.get_cached_weeks().await?;
        let fingerprint = self.store.get_metadata(CACHED_WEEKS_SETTINGS_KEY).await?;
        if !cached.is_empty() && fingerprint.as_deref() == Some(&self.settings.fingerprint()) {
            debug!(weeks = cached.len(), "serving materialized weeks");
            self.entries = match self.store.get_entries().await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "could not read cached entries, keeping those behind the weeks");
                    entries_behind(&cached)
                }
            };
            return Ok(Some(cached));
        }

        let entries = self.store.get_entries().await?;
        if entries.is_empty() {
            return Ok(None);
        }
        info!(entries = entries.len(), "recomputing weeks from cached entries");
        let weeks = self.recompute(&entries).await;
        self.materialize(&weeks).await;
        self.entries = entries;
        Ok(Some(weeks))
    }

    /// Stored entries merged over the ones held in memory. Falls back to
    /// memory alone when the store cannot be read.
    async fn known_entries(&self) -> Vec<TimeEntry> {
        match self.store.get_entries().await {
            Ok(stored) => upsert_entries(&self.entries, &stored),
            Err(err) => {
                warn!(error = %err, "could not read cached entries, using those in memory");
                self.entries.clone()
            }
        }
    }

    async fn reference_data(&self) -> ReferenceData {
        let projects = self.store.get_projects().await.unwrap_or_else(|err| {
            warn!(error = %err, "could not read projects");
            Vec::new()
        });
        let activities = self.store.get_activities().await.unwrap_or_else(|err| {
            warn!(error = %err, "could not read activities");
            Vec::new()
        });
        ReferenceData::new(projects, activities)
    }

    async fn recompute(&self, entries: &[TimeEntry]) -> Vec<WeekData> {
        let reference_data = self.reference_data().await;
        build_weekly_report(entries, &reference_data, &self.settings, self.now())
    }

    async fn materialize(&self, weeks: &[WeekData]) {
        if let Err(err) = self.store.save_cached_weeks(weeks).await {
            warn!(error = %err, "could not persist computed weeks");
            return;
        }
        if let Err(err) = self
            .store
            .save_metadata(CACHED_WEEKS_SETTINGS_KEY, &self.settings.fingerprint())
            .await
        {
            warn!(error = %err, "could not persist the cache fingerprint");
        }
    }

    fn start_refresh(&mut self, first_load: bool) {
        if let Some(generation) = self.in_flight {
            debug!(generation, "refresh already in flight, coalescing");
            self.reload_pending = true;
            return;
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        self.in_flight = Some(generation);

        let days = if first_load {
            self.options.first_load_days
        } else {
            self.options.refresh_days
        };
        let window = FetchWindow::last_days(self.now(), days);
        info!(generation, days, "refresh started");

        let remote = Arc::clone(&self.remote);
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            let result = fetch_remote(remote.as_ref(), &window).await;
            let _ = outcomes.send(FetchOutcome { generation, result });
        });

        self.state.status = transition(self.state.status, SyncEvent::RefreshStarted);
        self.state.syncing = true;
        self.publish();
    }

    async fn on_fetch_complete(&mut self, outcome: FetchOutcome) {
        self.in_flight = None;
        self.state.syncing = false;
        self.state.loading = false;

        match outcome.result {
            Ok(_) if outcome.generation <= self.published_generation => {
                debug!(
                    generation = outcome.generation,
                    published = self.published_generation,
                    "dropping stale refresh"
                );
                self.record_sync().await;
                self.state.status = transition(self.state.status, SyncEvent::RefreshSucceeded);
            }
            Ok(data) => self.apply_refresh(outcome.generation, data).await,
            Err(err) => self.apply_failure(err),
        }

        if std::mem::take(&mut self.reload_pending) {
            self.start_refresh(false);
        } else {
            self.publish();
        }
    }

    async fn apply_refresh(&mut self, generation: u64, data: FetchedData) {
        if let Some(projects) = &data.projects {
            if let Err(err) = self.store.save_projects(projects).await {
                warn!(error = %err, "could not persist projects");
            }
        }
        if let Some(activities) = &data.activities {
            if let Err(err) = self.store.save_activities(activities).await {
                warn!(error = %err, "could not persist activities");
            }
        }
        let Some(entries) = self.persist_entries(&data.entries).await else {
            self.state.status = transition(self.state.status, SyncEvent::RefreshFailed);
            return;
        };

        let weeks = self.recompute(&entries).await;
        self.materialize(&weeks).await;
        self.record_sync().await;

        info!(generation, fetched = data.entries.len(), weeks = weeks.len(), "refresh succeeded");
        self.published_generation = generation;
        self.state.weeks = weeks;
        self.state.error = None;
        self.state.status = transition(self.state.status, SyncEvent::RefreshSucceeded);
    }

    async fn record_sync(&mut self) {
        let now = self.now();
        if let Err(err) = self.store.save_metadata(LAST_SYNC_KEY, &now.to_rfc3339()).await {
            warn!(error = %err, "could not persist the last sync time");
        }
        self.state.last_synced_at = Some(now);
    }

    /// Upserts `incoming` and returns the full entry set to compute from.
    /// `None` after a fatal store failure.
    async fn persist_entries(&mut self, incoming: &[TimeEntry]) -> Option<Vec<TimeEntry>> {
        if let Err(err) = self.store.save_entries(incoming).await {
            if err.is_fatal() {
                self.state.error = Some(ReportError::Store(err.to_string()));
                error!(error = %err, "entity store unusable");
                return None;
            }
            warn!(error = %err, "could not persist entries, computing from memory");
        }
        let merged = upsert_entries(&self.known_entries().await, incoming);
        self.entries = merged.clone();
        Some(merged)
    }

    fn apply_failure(&mut self, err: RemoteError) {
        self.state.status = transition(self.state.status, SyncEvent::RefreshFailed);
        if err.is_auth() {
            warn!(error = %err, "remote rejected the credentials");
            self.state.error = Some(ReportError::Authentication(err.to_string()));
        } else if self.state.weeks.is_empty() {
            warn!(error = %err, "refresh failed with nothing cached");
            self.state.error = Some(ReportError::NoCachedData(err.to_string()));
        } else {
            warn!(error = %err, "refresh failed, keeping cached weeks");
        }
    }

    async fn apply_push(&mut self, entries: Vec<TimeEntry>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let Some(all) = self.persist_entries(&entries).await else {
            self.state.status = transition(self.state.status, SyncEvent::RefreshFailed);
            self.publish();
            return;
        };
        let weeks = self.recompute(&all).await;
        self.materialize(&weeks).await;

        info!(generation, pushed = entries.len(), "applied pushed snapshot");
        self.published_generation = generation;
        self.state.weeks = weeks;
        self.state.error = None;
        self.state.loading = false;
        self.publish();
    }

    fn connectivity_changed(&mut self, online: bool) {
        let was_online = std::mem::replace(&mut self.online, online);
        let event = if online {
            SyncEvent::ConnectivityOnline
        } else {
            SyncEvent::ConnectivityOffline
        };
        self.state.status = transition(self.state.status, event);
        if online && !was_online {
            info!("connectivity restored, scheduling refresh");
            self.sync_deadline = Some(Instant::now() + self.options.sync_debounce);
        }
        self.publish();
    }

    async fn fire_due_timers(&mut self) {
        let now = Instant::now();
        if self.settings_deadline.is_some_and(|d| d <= now) {
            self.settings_deadline = None;
            if let Some(settings) = self.pending_settings.take() {
                self.apply_settings(settings).await;
            }
        }
        if self.sync_deadline.is_some_and(|d| d <= now) {
            self.sync_deadline = None;
            if self.online {
                self.start_refresh(false);
            } else {
                debug!("skipping scheduled refresh while offline");
            }
        }
    }

    async fn apply_settings(&mut self, settings: BillingSettings) {
        if settings == self.settings {
            return;
        }
        self.settings = settings;
        let entries = self.known_entries().await;
        let weeks = self.recompute(&entries).await;
        self.entries = entries;
        self.materialize(&weeks).await;
        debug!(weeks = weeks.len(), "recomputed weeks for new settings");
        self.state.weeks = weeks;
        self.publish();
    }
}

fn entries_behind(weeks: &[WeekData]) -> Vec<TimeEntry> {
    weeks
        .iter()
        .flat_map(|week| week.bucket.entries.iter().map(|e| e.entry.clone()))
        .collect()
}

async fn fetch_remote(
    remote: &dyn RemoteSource,
    window: &FetchWindow,
) -> Result<FetchedData, RemoteError> {
    let entries = remote.fetch_entries(window).await?;
    let projects = remote
        .fetch_projects()
        .await
        .map_err(|err| warn!(error = %err, "could not fetch projects"))
        .ok();
    let activities = remote
        .fetch_activities()
        .await
        .map_err(|err| warn!(error = %err, "could not fetch activities"))
        .ok();
    Ok(FetchedData {
        entries,
        projects,
        activities,
    })
}

#[cfg(test)]
mod sync_weekly_reports_handler_tests {
    use super::*;
    use crate::modules::time_reports::adapters::outbound::entity_store_in_memory::InMemoryEntityStore;
    use crate::modules::time_reports::adapters::outbound::remote_source_in_memory::InMemoryRemoteSource;
    use crate::modules::time_reports::core::sync_status::SyncStatus;
    use crate::tests::fixtures::time_entries::{TimeEntryBuilder, acme_projects, at};
    use rstest::{fixture, rstest};

    type BeforeEachReturn = (Arc<InMemoryEntityStore>, Arc<InMemoryRemoteSource>, SyncOptions);

    fn monday_entry(id: i64, day: &str) -> TimeEntry {
        TimeEntryBuilder::new()
            .id(id)
            .project(1)
            .begin(&format!("{day}T09:00:00+00:00"))
            .end(&format!("{day}T10:30:00+00:00"))
            .build()
    }

    #[fixture]
    fn before_each() -> BeforeEachReturn {
        let store = Arc::new(InMemoryEntityStore::new());
        let remote = Arc::new(InMemoryRemoteSource::with_entries(vec![
            monday_entry(1, "2024-01-01"),
            monday_entry(2, "2024-01-08"),
        ]));
        let options = SyncOptions {
            settings_debounce: Duration::from_millis(20),
            sync_debounce: Duration::from_millis(20),
            clock: Arc::new(|| at("2024-01-20T12:00:00+00:00")),
            ..SyncOptions::default()
        };
        (store, remote, options)
    }

    fn spawn(
        store: &Arc<InMemoryEntityStore>,
        remote: &Arc<InMemoryRemoteSource>,
        rate: f64,
        options: SyncOptions,
    ) -> SyncCoordinator {
        SyncCoordinator::spawn(
            store.clone(),
            remote.clone(),
            BillingSettings::default().with_rate(rate),
            options,
        )
    }

    async fn wait_until(
        coordinator: &SyncCoordinator,
        condition: impl Fn(&ReportState) -> bool,
    ) -> ReportState {
        let mut rx = coordinator.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| condition(s)))
            .await
            .expect("timed out waiting for the coordinator")
            .expect("coordinator closed")
            .clone();
        state
    }

    async fn settled(coordinator: &SyncCoordinator) -> ReportState {
        wait_until(coordinator, |s| !s.syncing && !s.loading).await
    }

    fn total_amount(state: &ReportState) -> f64 {
        state.weeks.iter().map(|w| w.total_amount).sum()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fetch_persist_and_publish_on_first_load(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        remote.set_reference_data(acme_projects(), vec![]).await;
        let coordinator = spawn(&store, &remote, 10.0, options);

        coordinator.load(true).await.unwrap();
        let state = settled(&coordinator).await;

        assert_eq!(state.status, SyncStatus::Online);
        assert_eq!(state.error, None);
        assert_eq!(state.weeks.len(), 2);
        assert_eq!(state.weeks[0].bucket.week_key, "2024-W02");
        assert_eq!(state.weeks[0].total_amount, 900.0);
        assert_eq!(state.weeks[0].project_stats[0].name, "Acme");
        assert_eq!(state.last_synced_at, Some(at("2024-01-20T12:00:00+00:00")));
        assert_eq!(store.get_entries().await.unwrap().len(), 2);
        assert_eq!(store.get_cached_weeks().await.unwrap(), state.weeks);
        assert!(store.get_metadata(LAST_SYNC_KEY).await.unwrap().is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_cached_weeks_when_the_refresh_fails(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 10.0, options);
        coordinator.load(true).await.unwrap();
        let before = settled(&coordinator).await;

        remote.toggle_offline();
        coordinator.reload().await.unwrap();
        let after = settled(&coordinator).await;

        assert_eq!(after.weeks, before.weeks);
        assert_eq!(after.status, SyncStatus::Offline);
        assert_eq!(after.error, None);
        assert_eq!(after.last_synced_at, before.last_synced_at);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_serve_the_cache_before_the_network_answers(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let first = spawn(&store, &remote, 10.0, options.clone());
        first.load(true).await.unwrap();
        let cached = settled(&first).await;

        remote.set_delay_ms(200);
        let second = spawn(&store, &remote, 10.0, options);
        second.load(true).await.unwrap();
        let immediate = second.snapshot();

        assert_eq!(immediate.weeks, cached.weeks);
        assert!(!immediate.loading);
        assert!(immediate.syncing);
        assert_eq!(immediate.status, SyncStatus::Updating);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_recompute_settings_changes_without_the_network(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        let before = settled(&coordinator).await;
        let fetches = remote.entry_fetches();

        coordinator
            .update_settings(BillingSettings::default().with_rate(2.0))
            .await
            .unwrap();
        let expected = total_amount(&before) * 2.0;
        let after = wait_until(&coordinator, |s| total_amount(s) == expected).await;

        assert_eq!(remote.entry_fetches(), fetches);
        for (old, new) in before.weeks.iter().zip(&after.weeks) {
            assert_eq!(new.total_amount, old.total_amount * 2.0);
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_apply_only_the_last_of_rapid_settings_edits(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        settled(&coordinator).await;
        let writes = store.cached_weeks_writes();

        for rate in [2.0, 3.0, 4.0] {
            coordinator
                .update_settings(BillingSettings::default().with_rate(rate))
                .await
                .unwrap();
        }
        let state = wait_until(&coordinator, |s| s.weeks[0].total_amount == 360.0).await;

        assert_eq!(state.weeks[0].total_minutes, 90);
        assert_eq!(store.cached_weeks_writes(), writes + 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_coalesce_reloads_while_a_refresh_is_in_flight(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        remote.set_delay_ms(50);
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(true).await.unwrap();
        coordinator.reload().await.unwrap();
        coordinator.reload().await.unwrap();
        coordinator.reload().await.unwrap();
        settled(&coordinator).await;

        assert_eq!(remote.entry_fetches(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_drop_a_refresh_older_than_a_pushed_snapshot(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        remote.set_delay_ms(100);
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(true).await.unwrap();
        coordinator
            .push_snapshot(vec![monday_entry(9, "2024-01-15")])
            .await
            .unwrap();
        let state = settled(&coordinator).await;

        let keys: Vec<_> = state.weeks.iter().map(|w| w.bucket.week_key.clone()).collect();
        assert_eq!(keys, vec!["2024-W03"]);
        let stored: Vec<_> = store.get_entries().await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(stored, vec![9]);
        assert_eq!(state.status, SyncStatus::Online);
        assert_eq!(state.last_synced_at, Some(at("2024-01-20T12:00:00+00:00")));
        assert!(store.get_metadata(LAST_SYNC_KEY).await.unwrap().is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_merge_pushed_entries_with_the_cache(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        let before = settled(&coordinator).await;

        let edited = TimeEntryBuilder::new()
            .id(2)
            .project(1)
            .begin("2024-01-08T09:00:00+00:00")
            .end("2024-01-08T09:10:00+00:00")
            .build();
        coordinator.push_snapshot(vec![edited]).await.unwrap();
        let after = coordinator.snapshot();

        assert_eq!(after.status, before.status);
        assert_eq!(after.weeks[0].total_minutes, 10);
        assert_eq!(after.weeks[1].total_minutes, 90);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_rejected_credentials_distinctly(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        remote.toggle_unauthorized();
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(true).await.unwrap();
        let state = settled(&coordinator).await;

        assert!(matches!(state.error, Some(ReportError::Authentication(_))));
        assert_eq!(state.status, SyncStatus::Offline);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_show_an_error_only_when_nothing_is_cached(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        remote.toggle_offline();
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(true).await.unwrap();
        let state = settled(&coordinator).await;

        assert!(state.weeks.is_empty());
        assert!(matches!(state.error, Some(ReportError::NoCachedData(_))));
        assert_eq!(state.status, SyncStatus::Offline);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_rebuild_weeks_from_raw_entries_on_a_cold_cache(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        store.init().await.unwrap();
        store.save_entries(&[monday_entry(5, "2024-01-01")]).await.unwrap();
        remote.toggle_offline();
        let coordinator = spawn(&store, &remote, 10.0, options);

        coordinator.load(true).await.unwrap();
        let state = settled(&coordinator).await;

        assert_eq!(state.weeks.len(), 1);
        assert_eq!(state.weeks[0].total_amount, 900.0);
        assert_eq!(state.error, None);
        assert_eq!(store.get_cached_weeks().await.unwrap(), state.weeks);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_bypass_a_cache_computed_with_other_settings(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let first = spawn(&store, &remote, 1.0, options.clone());
        first.load(true).await.unwrap();
        let cheap = settled(&first).await;

        remote.toggle_offline();
        let second = spawn(&store, &remote, 3.0, options);
        second.load(true).await.unwrap();
        let state = settled(&second).await;

        assert_eq!(total_amount(&state), total_amount(&cheap) * 3.0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_compute_from_memory_when_the_store_backend_fails(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        store.init().await.unwrap();
        store.toggle_offline();
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(false).await.unwrap();
        let state = settled(&coordinator).await;

        assert_eq!(state.status, SyncStatus::Online);
        assert_eq!(state.weeks.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_recompute_settings_from_memory_when_the_store_is_unreadable(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        let before = settled(&coordinator).await;

        store.toggle_offline();
        coordinator
            .update_settings(BillingSettings::default().with_rate(2.0))
            .await
            .unwrap();
        let expected = total_amount(&before) * 2.0;
        let after = wait_until(&coordinator, |s| total_amount(s) == expected).await;

        assert_eq!(after.weeks.len(), before.weeks.len());
        assert_eq!(remote.entry_fetches(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_older_weeks_when_the_store_is_unreadable_during_a_refresh(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        let before = settled(&coordinator).await;
        assert_eq!(before.weeks.len(), 2);

        store.toggle_offline();
        remote.set_entries(vec![monday_entry(3, "2024-01-15")]).await;
        coordinator.reload().await.unwrap();
        let after = settled(&coordinator).await;

        let keys: Vec<_> = after.weeks.iter().map(|w| w.bucket.week_key.clone()).collect();
        assert_eq!(keys, vec!["2024-W03", "2024-W02", "2024-W01"]);
        assert_eq!(after.status, SyncStatus::Online);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_leave_updating_when_the_store_fails_during_a_refresh(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.reload().await.unwrap();
        let state = settled(&coordinator).await;

        assert_eq!(state.status, SyncStatus::Offline);
        assert!(matches!(state.error, Some(ReportError::Store(_))));

        coordinator.connectivity_changed(true).await.unwrap();
        assert_eq!(coordinator.snapshot().status, SyncStatus::Online);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_fatally_on_an_uninitialized_store(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(false).await.unwrap();
        let state = coordinator.snapshot();

        assert!(matches!(state.error, Some(ReportError::Store(_))));
        assert!(!state.loading);
        assert_eq!(remote.entry_fetches(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_stay_updating_through_connectivity_events(
        before_each: BeforeEachReturn,
    ) {
        let (store, remote, options) = before_each;
        remote.set_delay_ms(100);
        let coordinator = spawn(&store, &remote, 1.0, options);

        coordinator.load(true).await.unwrap();
        coordinator.connectivity_changed(false).await.unwrap();
        assert_eq!(coordinator.snapshot().status, SyncStatus::Updating);

        let state = settled(&coordinator).await;
        assert_eq!(state.status, SyncStatus::Online);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refresh_after_connectivity_returns(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(
            &store,
            &remote,
            1.0,
            SyncOptions {
                assume_online: false,
                ..options
            },
        );

        coordinator.load(true).await.unwrap();
        assert_eq!(remote.entry_fetches(), 0);
        assert_eq!(coordinator.snapshot().status, SyncStatus::Offline);

        coordinator.connectivity_changed(true).await.unwrap();
        let state = wait_until(&coordinator, |s| s.last_synced_at.is_some() && !s.syncing).await;

        assert_eq!(remote.entry_fetches(), 1);
        assert_eq!(state.status, SyncStatus::Online);
        assert_eq!(state.weeks.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_debounce_navigation_sync_requests(before_each: BeforeEachReturn) {
        let (store, remote, options) = before_each;
        let coordinator = spawn(&store, &remote, 1.0, options);
        coordinator.load(true).await.unwrap();
        settled(&coordinator).await;

        for _ in 0..3 {
            coordinator.request_sync().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        settled(&coordinator).await;

        assert_eq!(remote.entry_fetches(), 2);
    }
}

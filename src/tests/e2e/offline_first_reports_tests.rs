use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::modules::time_reports::adapters::outbound::entity_store::EntityStore;
use crate::modules::time_reports::adapters::outbound::entity_store_sqlite::SqliteEntityStore;
use crate::modules::time_reports::adapters::outbound::remote_source_in_memory::InMemoryRemoteSource;
use crate::modules::time_reports::core::settings::BillingSettings;
use crate::modules::time_reports::use_cases::sync_weekly_reports::handler::{
    SyncCoordinator, SyncOptions,
};
use crate::modules::time_reports::use_cases::sync_weekly_reports::report_state::ReportState;
use crate::shell::http::router;
use crate::shell::state::AppState;
use crate::tests::fixtures::time_entries::{TimeEntryBuilder, acme_projects, at};

struct World {
    store: Arc<SqliteEntityStore>,
    remote: Arc<InMemoryRemoteSource>,
    options: SyncOptions,
}

#[fixture]
fn before_each() -> World {
    let remote = InMemoryRemoteSource::with_entries(vec![
        TimeEntryBuilder::new()
            .id(1)
            .project(1)
            .begin("2024-01-08T09:00:00+00:00")
            .end("2024-01-08T11:00:00+00:00")
            .build(),
        TimeEntryBuilder::new()
            .id(2)
            .project(2)
            .begin("2024-01-09T09:00:00+00:00")
            .end("2024-01-09T09:30:00+00:00")
            .tags(&["internal"])
            .build(),
    ]);
    World {
        store: Arc::new(SqliteEntityStore::in_memory()),
        remote: Arc::new(remote),
        options: SyncOptions {
            settings_debounce: Duration::from_millis(10),
            sync_debounce: Duration::from_millis(10),
            clock: Arc::new(|| at("2024-01-20T12:00:00+00:00")),
            ..SyncOptions::default()
        },
    }
}

fn build_app(world: &World, settings: BillingSettings) -> (Router, SyncCoordinator) {
    let coordinator = SyncCoordinator::spawn(
        world.store.clone(),
        world.remote.clone(),
        settings,
        world.options.clone(),
    );
    let state = AppState {
        coordinator: coordinator.clone(),
        settings_file: None,
    };
    (router(state), coordinator)
}

async fn settle(coordinator: &SyncCoordinator, condition: impl Fn(&ReportState) -> bool) {
    let mut rx = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| condition(s)))
        .await
        .unwrap()
        .unwrap();
}

async fn get_weeks(app: &Router) -> Value {
    let response = app
        .clone()
        .oneshot(Request::get("/weeks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> StatusCode {
    app.clone().oneshot(request).await.unwrap().status()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[rstest]
#[tokio::test]
async fn it_should_serve_reports_through_an_outage_and_a_settings_change(before_each: World) {
    let world = before_each;
    world.remote.set_reference_data(acme_projects(), vec![]).await;
    let settings = BillingSettings::default()
        .with_rate(1.0)
        .with_excluded_tags(["internal"]);
    let (app, coordinator) = build_app(&world, settings);

    coordinator.load(true).await.unwrap();
    settle(&coordinator, |s| !s.syncing && !s.loading).await;
    let online = get_weeks(&app).await;
    assert_eq!(online["status"], "online");
    assert_eq!(online["weeks"][0]["week_key"], "2024-W02");
    assert_eq!(online["weeks"][0]["total_minutes"], 120);
    assert_eq!(online["weeks"][0]["raw_total_minutes"], 150);
    assert_eq!(online["weeks"][0]["total_amount"], 120.0);
    assert_eq!(online["weeks"][0]["project_stats"][0]["name"], "Acme");

    world.remote.toggle_offline();
    let reload = Request::post("/reload").body(Body::empty()).unwrap();
    assert_eq!(send(&app, reload).await, StatusCode::ACCEPTED);
    settle(&coordinator, |s| !s.syncing && s.revision > 0).await;
    let offline = get_weeks(&app).await;
    assert_eq!(offline["status"], "offline");
    assert_eq!(offline["error"], Value::Null);
    assert_eq!(offline["weeks"], online["weeks"]);

    let status = send(
        &app,
        json_request(
            "PUT",
            "/settings",
            json!({ "rate_per_minute": 2, "excluded_tags": ["internal"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    settle(&coordinator, |s| s.weeks.first().is_some_and(|w| w.total_amount == 240.0)).await;
    assert_eq!(world.remote.entry_fetches(), 2);
}

#[rstest]
#[tokio::test]
async fn it_should_start_from_the_persisted_cache_without_the_network(before_each: World) {
    let world = before_each;
    let settings = BillingSettings::default().with_rate(1.0);
    let (_, first) = build_app(&world, settings.clone());
    first.load(true).await.unwrap();
    settle(&first, |s| !s.syncing && !s.loading).await;

    world.remote.toggle_offline();
    let (app, second) = build_app(&world, settings);
    second.load(true).await.unwrap();
    settle(&second, |s| !s.syncing && !s.loading).await;

    let weeks = get_weeks(&app).await;
    assert_eq!(weeks["weeks"][0]["week_key"], "2024-W02");
    assert_eq!(weeks["weeks"][0]["total_amount"], 150.0);
    assert_eq!(weeks["status"], "offline");
    assert!(weeks["last_synced_at"].is_string());
}

#[rstest]
#[tokio::test]
async fn it_should_fold_pushed_entries_into_the_published_weeks(before_each: World) {
    let world = before_each;
    let (app, coordinator) = build_app(&world, BillingSettings::default().with_rate(1.0));
    coordinator.load(true).await.unwrap();
    settle(&coordinator, |s| !s.syncing && !s.loading).await;

    let status = send(
        &app,
        json_request(
            "POST",
            "/push",
            json!({
                "type": "entries",
                "data": [{
                    "id": 30,
                    "begin": "2024-01-16T08:00:00+01:00",
                    "end": "2024-01-16T09:00:00+01:00",
                    "project": {"id": 1, "name": "Acme"},
                    "activity_id": null,
                    "tags": []
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let weeks = get_weeks(&app).await;
    let keys: Vec<_> = weeks["weeks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["week_key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["2024-W03", "2024-W02"]);
    assert_eq!(weeks["weeks"][0]["project_stats"][0]["project_id"], 1);
    assert_eq!(world.store.get_entries().await.unwrap().len(), 3);
}

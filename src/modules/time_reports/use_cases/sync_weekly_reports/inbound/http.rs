use axum::{
    Json,
    extract::State,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::modules::time_reports::core::settings::BillingSettings;
use crate::modules::time_reports::core::sync_status::SyncStatus;
use crate::modules::time_reports::use_cases::sync_weekly_reports::push_message::{
    PushMessage, PushPayload,
};
use crate::modules::time_reports::use_cases::sync_weekly_reports::report_state::{
    CoordinatorClosed, ReportError,
};
use crate::shell::state::AppState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: SyncStatus,
    pub loading: bool,
    pub syncing: bool,
    pub error: Option<ReportError>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

#[derive(Deserialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

fn accepted(result: Result<(), CoordinatorClosed>) -> Response {
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(CoordinatorClosed) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

pub async fn weeks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.snapshot())
}

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.coordinator.snapshot();
    Json(StatusResponse {
        status: snapshot.status,
        loading: snapshot.loading,
        syncing: snapshot.syncing,
        error: snapshot.error,
        last_synced_at: snapshot.last_synced_at,
        revision: snapshot.revision,
    })
}

pub async fn reload(State(state): State<AppState>) -> impl IntoResponse {
    accepted(state.coordinator.reload().await)
}

pub async fn navigate(State(state): State<AppState>) -> impl IntoResponse {
    accepted(state.coordinator.request_sync().await)
}

pub async fn connectivity(
    State(state): State<AppState>,
    body: Result<Json<ConnectivityBody>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(body)) = body else {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    };
    accepted(state.coordinator.connectivity_changed(body.online).await)
}

pub async fn update_settings(
    State(state): State<AppState>,
    body: Result<Json<BillingSettings>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(settings)) = body else {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    };
    if let Some(file) = &state.settings_file {
        if let Err(err) = file.save(&settings).await {
            warn!(error = %err, "could not persist settings");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    accepted(state.coordinator.update_settings(settings).await)
}

pub async fn push(
    State(state): State<AppState>,
    body: Result<Json<PushMessage>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(message)) = body else {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    };
    match message.into_payload() {
        Ok(PushPayload::Entries(entries)) => {
            accepted(state.coordinator.push_snapshot(entries).await)
        }
        Ok(PushPayload::Ignored(kind)) => {
            debug!(kind = %kind, "ignoring push message");
            StatusCode::ACCEPTED.into_response()
        }
        Err(err) => {
            warn!(error = %err, "malformed entries push");
            StatusCode::UNPROCESSABLE_ENTITY.into_response()
        }
    }
}

// HTTP implementations of the RemoteSource port.
//
// Purpose
// - Talk to the time-tracking service directly, or to a backend proxy that
//   fronts it.
//
// Responsibilities
// - Paginate entry requests inside the requested window.
// - Normalize remote entry shapes into TimeEntry. Project and activity
//   references arrive either as ids or as embedded objects.
// - Map transport and status failures onto RemoteError so the coordinator
//   can tell auth problems from transient ones.
//
// Boundaries
// - Rows whose timestamps cannot be read are skipped with a warning.

use crate::modules::time_reports::adapters::outbound::remote_source::{
    FetchWindow, MAX_PAGES, PAGE_SIZE, RemoteError, RemoteSource, collect_pages,
};
use crate::modules::time_reports::core::time_entry::{Activity, Project, TimeEntry};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reference {
    Id(i64),
    Object { id: i64 },
}

impl Reference {
    fn id(&self) -> i64 {
        match self {
            Reference::Id(id) | Reference::Object { id } => *id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Tag {
    Name(String),
    Object { name: String },
}

/// Entry as the time-tracking service and the push channel send it.
#[derive(Debug, Deserialize)]
pub(crate) struct RemoteEntry {
    id: i64,
    begin: String,
    #[serde(default)]
    end: Option<String>,
    #[serde(default, alias = "project_id")]
    project: Option<Reference>,
    #[serde(default, alias = "activity_id")]
    activity: Option<Reference>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

impl RemoteEntry {
    fn into_time_entry(self) -> Option<TimeEntry> {
        let Some(begin) = parse_timestamp(&self.begin) else {
            warn!(id = self.id, begin = %self.begin, "skipping entry with unreadable begin");
            return None;
        };
        let end = match self.end.as_deref().filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => match parse_timestamp(raw) {
                Some(end) => Some(end),
                None => {
                    warn!(id = self.id, end = %raw, "skipping entry with unreadable end");
                    return None;
                }
            },
        };
        Some(TimeEntry {
            id: self.id,
            begin,
            end,
            project_id: self.project.as_ref().map(Reference::id),
            activity_id: self.activity.as_ref().map(Reference::id),
            description: self.description.filter(|d| !d.is_empty()),
            tags: self
                .tags
                .into_iter()
                .map(|tag| match tag {
                    Tag::Name(name) | Tag::Object { name } => name,
                })
                .collect(),
        })
    }
}

pub(crate) fn normalize(rows: Vec<RemoteEntry>) -> Vec<TimeEntry> {
    rows.into_iter()
        .filter_map(RemoteEntry::into_time_entry)
        .collect()
}

fn build_client() -> Result<Client, RemoteError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| RemoteError::NotConfigured(e.to_string()))
}

fn map_transport(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else if error.is_decode() {
        RemoteError::Decode(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, RemoteError> {
    let response = request.send().await.map_err(map_transport)?;
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(map_transport)?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized(status.as_u16()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RemoteError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Direct client of the time-tracking service's REST API.
pub struct TimeTrackerApiSource {
    client: Client,
    base_url: String,
    token: String,
}

impl TimeTrackerApiSource {
    pub fn new(base_url: &str, token: &str) -> Result<Self, RemoteError> {
        if base_url.trim().is_empty() {
            return Err(RemoteError::NotConfigured("missing API URL".into()));
        }
        if token.trim().is_empty() {
            return Err(RemoteError::NotConfigured("missing API token".into()));
        }
        Ok(Self {
            client: build_client()?,
            base_url: trim_base(base_url),
            token: token.to_string(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn fetch_paged<T: DeserializeOwned + Send>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, RemoteError> {
        collect_pages(|page| {
            let request = self.get(path).query(&[
                ("page", page.to_string()),
                ("size", PAGE_SIZE.to_string()),
            ]);
            async move { send_json::<Vec<T>>(request).await }
        })
        .await
    }
}

#[async_trait]
impl RemoteSource for TimeTrackerApiSource {
    async fn fetch_entries(&self, window: &FetchWindow) -> Result<Vec<TimeEntry>, RemoteError> {
        let (begin, end) = window.query_bounds();
        let rows = collect_pages(|page| {
            let request = self.get("/api/timesheets").query(&[
                ("page", page.to_string()),
                ("size", PAGE_SIZE.to_string()),
                ("begin", begin.clone()),
                ("end", end.clone()),
                ("full", "true".to_string()),
            ]);
            async move {
                debug!(page, "fetching timesheet page");
                send_json::<Vec<RemoteEntry>>(request).await
            }
        })
        .await?;
        Ok(normalize(rows))
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>, RemoteError> {
        self.fetch_paged("/api/projects").await
    }

    async fn fetch_activities(&self) -> Result<Vec<Activity>, RemoteError> {
        self.fetch_paged("/api/activities").await
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self.get("/api/ping").send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct EntriesPage {
    entries: Vec<RemoteEntry>,
    #[serde(default)]
    total: Option<usize>,
}

/// Client of the backend proxy, which pages by offset and reports a total.
pub struct BackendProxySource {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendProxySource {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, RemoteError> {
        if base_url.trim().is_empty() {
            return Err(RemoteError::NotConfigured("missing backend URL".into()));
        }
        Ok(Self {
            client: build_client()?,
            base_url: trim_base(base_url),
            token: token.filter(|t| !t.trim().is_empty()).map(str::to_string),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_paged<T: DeserializeOwned + Send>(
        &self,
        path: &str,
    ) -> Result<Vec<T>, RemoteError> {
        collect_pages(|page| {
            let offset = (page - 1) * PAGE_SIZE;
            let request = self.get(path).query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            async move { send_json::<Vec<T>>(request).await }
        })
        .await
    }
}

#[async_trait]
impl RemoteSource for BackendProxySource {
    async fn fetch_entries(&self, window: &FetchWindow) -> Result<Vec<TimeEntry>, RemoteError> {
        let (start, end) = (window.start.to_rfc3339(), window.end.to_rfc3339());
        let mut rows = Vec::new();
        for _ in 0..MAX_PAGES {
            let offset = rows.len();
            let request = self.get("/entries").query(&[
                ("start", start.clone()),
                ("end", end.clone()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ]);
            let page: EntriesPage = send_json(request).await?;
            let count = page.entries.len();
            rows.extend(page.entries);
            let reached_total = page.total.is_some_and(|total| rows.len() >= total);
            if count < PAGE_SIZE || reached_total {
                return Ok(normalize(rows));
            }
        }
        warn!(max_pages = MAX_PAGES, "stopped paging the backend at the page cap");
        Ok(normalize(rows))
    }

    async fn fetch_projects(&self) -> Result<Vec<Project>, RemoteError> {
        self.fetch_paged("/projects").await
    }

    async fn fetch_activities(&self) -> Result<Vec<Activity>, RemoteError> {
        self.fetch_paged("/activities").await
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self.get("/projects").send().await.map_err(map_transport)?;
        check_status(response).await.map(|_| ())
    }
}

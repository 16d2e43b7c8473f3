//! Telemetry client - fetches the latest session's timing resources.
//!
//! Every fetch targets `{base}/{resource}?session_key=latest`. Transport
//! failures and non-success statuses come back as `Ok(None)` so the caller
//! can skip that resource for one cycle; a body that does not match the
//! record shape is a `TelemetryError::Decode`.
//!
//! Production code uses `HttpTelemetryClient`. Tests use
//! `FakeTelemetrySource` with scripted responses.

use async_trait::async_trait;
use lapwatch_common::{ExporterConfig, IntervalRecord, LapRecord, PositionRecord, SessionDescriptor};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Upstream resource collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Sessions,
    Laps,
    Intervals,
    Positions,
}

impl Resource {
    /// URL path segment
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Sessions => "sessions",
            Resource::Laps => "laps",
            Resource::Intervals => "intervals",
            Resource::Positions => "position",
        }
    }

    /// Metric label value
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Sessions => "sessions",
            Resource::Laps => "laps",
            Resource::Intervals => "intervals",
            Resource::Positions => "positions",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Unexpected {resource} payload: {source}")]
    Decode {
        resource: Resource,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// `Ok(None)` means no data for this cycle
pub type FetchResult<T> = Result<Option<Vec<T>>, TelemetryError>;

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_sessions(&self) -> FetchResult<SessionDescriptor>;

    async fn fetch_laps(&self) -> FetchResult<LapRecord>;

    async fn fetch_intervals(&self) -> FetchResult<IntervalRecord>;

    async fn fetch_positions(&self) -> FetchResult<PositionRecord>;
}

/// HTTP client for the upstream timing API
pub struct HttpTelemetryClient {
    http: reqwest::Client,
    base_url: String,
    session_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpTelemetryClient {
    pub fn new(
        base_url: &str,
        session_timeout: Duration,
        fetch_timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        // Timeouts are set per request
        let http = reqwest::Client::builder()
            .user_agent(concat!("lapwatchd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_timeout,
            fetch_timeout,
        })
    }

    pub fn from_config(config: &ExporterConfig) -> anyhow::Result<Self> {
        let base_url = config.base_url()?;
        Ok(Self::new(
            base_url,
            config.session_timeout(),
            config.fetch_timeout(),
        )?)
    }

    pub fn url(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource.path())
    }

    async fn fetch<T: DeserializeOwned>(&self, resource: Resource) -> FetchResult<T> {
        let timeout = match resource {
            Resource::Sessions => self.session_timeout,
            _ => self.fetch_timeout,
        };
        let url = self.url(resource);

        let response = match self
            .http
            .get(&url)
            .query(&[("session_key", "latest")])
            .header(ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Telemetry fetch error for {}: {}", resource, e);
                return Ok(None);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Telemetry fetch for {} returned HTTP {}", resource, status);
            return Ok(None);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Telemetry body read error for {}: {}", resource, e);
                return Ok(None);
            }
        };

        let records: Vec<T> = serde_json::from_slice(&body)
            .map_err(|source| TelemetryError::Decode { resource, source })?;
        debug!("Fetched {} {} records", records.len(), resource);
        Ok(Some(records))
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetryClient {
    async fn fetch_sessions(&self) -> FetchResult<SessionDescriptor> {
        self.fetch(Resource::Sessions).await
    }

    async fn fetch_laps(&self) -> FetchResult<LapRecord> {
        self.fetch(Resource::Laps).await
    }

    async fn fetch_intervals(&self) -> FetchResult<IntervalRecord> {
        self.fetch(Resource::Intervals).await
    }

    async fn fetch_positions(&self) -> FetchResult<PositionRecord> {
        self.fetch(Resource::Positions).await
    }
}

// ============================================================================
// Fake Telemetry Source (Testing)
// ============================================================================

/// Scripted response for one fetch
#[derive(Debug, Clone)]
pub enum FakeResponse<T> {
    Records(Vec<T>),
    /// Transport failure or non-success status
    Unavailable,
    /// Body that does not decode
    Malformed,
}

impl<T: DeserializeOwned + Clone> FakeResponse<T> {
    fn resolve(&self, resource: Resource) -> FetchResult<T> {
        match self {
            FakeResponse::Records(records) => Ok(Some(records.clone())),
            FakeResponse::Unavailable => Ok(None),
            FakeResponse::Malformed => match serde_json::from_str::<Vec<T>>("{}") {
                Ok(records) => Ok(Some(records)),
                Err(source) => Err(TelemetryError::Decode { resource, source }),
            },
        }
    }
}

/// Queue of scripted responses; the last one repeats once the queue drains
struct Script<T> {
    queue: Mutex<VecDeque<FakeResponse<T>>>,
}

impl<T: DeserializeOwned + Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, response: FakeResponse<T>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(response);
        }
    }

    fn next(&self, resource: Resource) -> FetchResult<T> {
        let Ok(mut queue) = self.queue.lock() else {
            return Ok(None);
        };
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match response {
            Some(response) => response.resolve(resource),
            None => Ok(None),
        }
    }
}

/// Fake telemetry source for deterministic tests
pub struct FakeTelemetrySource {
    sessions: Script<SessionDescriptor>,
    laps: Script<LapRecord>,
    intervals: Script<IntervalRecord>,
    positions: Script<PositionRecord>,
    calls: Mutex<HashMap<Resource, usize>>,
}

impl FakeTelemetrySource {
    pub fn new() -> Self {
        Self {
            sessions: Script::new(),
            laps: Script::new(),
            intervals: Script::new(),
            positions: Script::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_session(self, response: FakeResponse<SessionDescriptor>) -> Self {
        self.sessions.push(response);
        self
    }

    pub fn with_laps(self, response: FakeResponse<LapRecord>) -> Self {
        self.laps.push(response);
        self
    }

    pub fn with_intervals(self, response: FakeResponse<IntervalRecord>) -> Self {
        self.intervals.push(response);
        self
    }

    pub fn with_positions(self, response: FakeResponse<PositionRecord>) -> Self {
        self.positions.push(response);
        self
    }

    /// Number of fetches issued for a resource
    pub fn calls(&self, resource: Resource) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&resource).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn count(&self, resource: Resource) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(resource).or_insert(0) += 1;
        }
    }
}

impl Default for FakeTelemetrySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for FakeTelemetrySource {
    async fn fetch_sessions(&self) -> FetchResult<SessionDescriptor> {
        self.count(Resource::Sessions);
        self.sessions.next(Resource::Sessions)
    }

    async fn fetch_laps(&self) -> FetchResult<LapRecord> {
        self.count(Resource::Laps);
        self.laps.next(Resource::Laps)
    }

    async fn fetch_intervals(&self) -> FetchResult<IntervalRecord> {
        self.count(Resource::Intervals);
        self.intervals.next(Resource::Intervals)
    }

    async fn fetch_positions(&self) -> FetchResult<PositionRecord> {
        self.count(Resource::Positions);
        self.positions.next(Resource::Positions)
    }
}

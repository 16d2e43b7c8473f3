//! Poll loop - resolve session type, fetch, transform, apply, sleep.
//!
//! Qualifying polls laps only. Race and sprint poll laps, intervals and
//! positions, awaited together so all three are in hand before the
//! transform runs. Other session types idle.

use crate::client::{Resource, TelemetryError, TelemetrySource};
use crate::metrics::MetricsRegistry;
use crate::session::SessionTracker;
use crate::transform::{self, TransformError};
use lapwatch_common::{DriverDirectory, PollingConfig, SessionType};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl CycleError {
    /// Label used when counting aborted cycles
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Telemetry(TelemetryError::Decode { .. }) => "decode",
            CycleError::Telemetry(TelemetryError::Client(_)) => "client",
            CycleError::Transform(e) => e.kind(),
        }
    }
}

/// Result of one completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Gauge updates written
    Applied { updates: usize },
    /// Session is not polled
    Idle,
    /// Every fetch this cycle came back empty-handed
    NoData,
}

pub struct Scheduler {
    source: Arc<dyn TelemetrySource>,
    tracker: SessionTracker,
    directory: Arc<DriverDirectory>,
    metrics: MetricsRegistry,
    polling: PollingConfig,
    session: SessionType,
    cycles: u64,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        directory: Arc<DriverDirectory>,
        metrics: MetricsRegistry,
        polling: PollingConfig,
    ) -> Self {
        let tracker = SessionTracker::new(source.clone(), polling.session_cache_ttl());
        Self {
            source,
            tracker,
            directory,
            metrics,
            polling,
            session: SessionType::Unknown,
            cycles: 0,
        }
    }

    pub fn session(&self) -> SessionType {
        self.session
    }

    /// Wait for the first session type. No cycle runs before this returns.
    pub async fn start(&mut self) -> SessionType {
        self.session = self
            .tracker
            .wait_for_session(self.polling.startup_retry())
            .await;
        self.session
    }

    /// Sleep between cycles for the current session
    pub fn cadence(&self) -> Duration {
        if self.session.is_race_like() {
            self.polling.race_interval()
        } else {
            self.polling.idle_interval()
        }
    }

    /// Resolve the session and poll forever.
    pub async fn run(&mut self) {
        self.start().await;

        loop {
            self.refresh_session().await;

            match self.run_cycle().await {
                Ok(CycleOutcome::Applied { updates }) => {
                    info!("Updated {} metrics ({} gauge writes)", self.session, updates);
                }
                Ok(CycleOutcome::Idle) => {
                    debug!("Session {} is not polled", self.session);
                }
                Ok(CycleOutcome::NoData) => {
                    warn!("No {} data this cycle", self.session);
                }
                Err(e) => {
                    error!("Cycle aborted: {}", e);
                }
            }

            tokio::time::sleep(self.cadence()).await;
        }
    }

    /// Re-resolve the session every `session_refresh_cycles` cycles.
    /// An unresolved lookup keeps the current type.
    async fn refresh_session(&mut self) {
        let every = u64::from(self.polling.session_refresh_cycles);
        if every == 0 || self.cycles == 0 || self.cycles % every != 0 {
            return;
        }

        let kind = self.tracker.resolve().await;
        if !kind.is_known() {
            warn!("Session refresh failed, keeping {}", self.session);
        } else if kind != self.session {
            info!("Session changed from {} to {}", self.session, kind);
            self.session = kind;
        }
    }

    /// One fetch-transform-apply pass for the current session type.
    ///
    /// On error nothing from this cycle is applied.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CycleError> {
        self.cycles += 1;

        let result = match self.session {
            SessionType::Qualifying => self.qualifying_cycle().await,
            SessionType::Race | SessionType::Sprint => self.race_cycle().await,
            SessionType::Practice | SessionType::Unknown => Ok(CycleOutcome::Idle),
        };

        match &result {
            Ok(CycleOutcome::NoData) => {}
            Ok(_) => self.metrics.record_cycle(self.session.as_str()),
            Err(e) => self.metrics.record_cycle_error(e.kind()),
        }
        result
    }

    async fn qualifying_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let laps = self.source.fetch_laps().await?;
        let Some(laps) = laps else {
            self.metrics.record_fetch_failure(Resource::Laps.label());
            return Ok(CycleOutcome::NoData);
        };

        let updates = transform::lap_updates(&laps, &self.directory)?;
        Ok(self.commit(&updates))
    }

    async fn race_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let (laps, intervals, positions) = tokio::join!(
            self.source.fetch_laps(),
            self.source.fetch_intervals(),
            self.source.fetch_positions(),
        );
        let (laps, intervals, positions) = (laps?, intervals?, positions?);

        for (resource, missing) in [
            (Resource::Laps, laps.is_none()),
            (Resource::Intervals, intervals.is_none()),
            (Resource::Positions, positions.is_none()),
        ] {
            if missing {
                self.metrics.record_fetch_failure(resource.label());
            }
        }
        if laps.is_none() && intervals.is_none() && positions.is_none() {
            return Ok(CycleOutcome::NoData);
        }

        let updates = transform::race_updates(
            laps.as_deref(),
            intervals.as_deref(),
            positions.as_deref(),
            &self.directory,
        )?;
        Ok(self.commit(&updates))
    }

    fn commit(&self, updates: &[transform::GaugeUpdate]) -> CycleOutcome {
        transform::apply(updates, &self.metrics);
        if !updates.is_empty() {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            self.metrics.mark_updated(now.as_secs_f64());
        }
        CycleOutcome::Applied {
            updates: updates.len(),
        }
    }
}

//! Session tracker - resolves the current session type with a short cache.

use crate::client::TelemetrySource;
use lapwatch_common::SessionType;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default cache lifetime for a resolved session type
pub const SESSION_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct CachedSession {
    kind: SessionType,
    fetched_at: Instant,
}

pub struct SessionTracker {
    source: Arc<dyn TelemetrySource>,
    ttl: Duration,
    cached: Option<CachedSession>,
}

impl SessionTracker {
    pub fn new(source: Arc<dyn TelemetrySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: None,
        }
    }

    /// Current session type.
    ///
    /// Served from cache while younger than the TTL. A failed, empty or
    /// malformed lookup yields `Unknown` and leaves the cache untouched.
    pub async fn resolve(&mut self) -> SessionType {
        if let Some(cached) = self.cached {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!("Session cache hit: {}", cached.kind);
                return cached.kind;
            }
        }

        let sessions = match self.source.fetch_sessions().await {
            Ok(Some(sessions)) => sessions,
            Ok(None) => return SessionType::Unknown,
            Err(e) => {
                warn!("Session fetch error: {}", e);
                return SessionType::Unknown;
            }
        };

        let Some(first) = sessions.first() else {
            warn!("Session lookup returned no sessions");
            return SessionType::Unknown;
        };

        let kind = first.kind();
        if !kind.is_known() {
            warn!(
                "Unrecognized session type {:?}",
                first.session_type.as_deref().unwrap_or("<missing>")
            );
            return SessionType::Unknown;
        }

        self.cached = Some(CachedSession {
            kind,
            fetched_at: Instant::now(),
        });
        kind
    }

    /// Block until a session type resolves, retrying every `retry`.
    pub async fn wait_for_session(&mut self, retry: Duration) -> SessionType {
        loop {
            let kind = self.resolve().await;
            if kind.is_known() {
                info!("Session type: {}", kind);
                return kind;
            }
            info!("Session type unavailable, retrying in {}s", retry.as_secs());
            tokio::time::sleep(retry).await;
        }
    }
}

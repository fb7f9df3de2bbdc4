//! # Session Store
//!
//! Append-only archive of named, finished sessions, kept as one JSON array
//! under [`SESSIONS_KEY`].

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::session::TrackingSession;
use crate::store::{KeyValueStore, SESSIONS_KEY};
use crate::{Result, RoutePoint, TrackerError};

/// A finished route. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSession {
    /// Creation time in epoch milliseconds
    pub id: i64,
    pub name: String,
    pub iso_date: String,
    pub total_distance_km: f64,
    pub elapsed_ms: i64,
    pub data: Vec<RoutePoint>,
}

/// Archive of saved sessions on top of a durable store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Append `session` under `name`.
    ///
    /// Fails with [`TrackerError::InvalidSession`] when the name is blank or
    /// the route log is empty; nothing is written in that case.
    pub fn save(&self, name: &str, session: &TrackingSession, now_ms: i64) -> Result<SavedSession> {
        if session.is_empty() {
            return Err(TrackerError::invalid_session("route log is empty"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::invalid_session("name is empty"));
        }

        let saved = SavedSession {
            id: now_ms,
            name: name.to_string(),
            iso_date: iso_date(now_ms),
            total_distance_km: session.total_distance_km(),
            elapsed_ms: session.elapsed_ms(),
            data: session.route_log().to_vec(),
        };

        let mut sessions = self.list();
        sessions.push(saved.clone());
        let json = serde_json::to_string(&sessions)?;
        self.store.set(SESSIONS_KEY, &json)?;

        info!(
            "[SessionStore] Saved '{}' ({} points, {:.2} km)",
            saved.name,
            saved.data.len(),
            saved.total_distance_km
        );
        Ok(saved)
    }

    /// All saved sessions, oldest first.
    ///
    /// Unreadable or unparseable storage degrades to an empty list.
    pub fn list(&self) -> Vec<SavedSession> {
        let raw = match self.store.get(SESSIONS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("[SessionStore] Failed to read sessions: {}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("[SessionStore] Stored sessions are corrupt, ignoring: {}", e);
                Vec::new()
            }
        }
    }

    /// Remove every saved session. Irreversible.
    pub fn clear_all(&self) -> Result<()> {
        self.store.remove(SESSIONS_KEY)?;
        info!("[SessionStore] Cleared all sessions");
        Ok(())
    }
}

fn iso_date(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

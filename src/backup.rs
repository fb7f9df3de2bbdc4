//! # Backup Manager
//!
//! Crash snapshots of the in-progress route.
//!
//! While tracking, a repeating timer writes a [`BackupSnapshot`] into the
//! single backup slot. At startup the slot is inspected before anything
//! else runs, and a fresh, non-empty snapshot is offered for restoration.
//! The timer is restarted (never resumed) on every entry into tracking.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{TimerHandle, TimerService};
use crate::map::MapRenderer;
use crate::session::TrackingSession;
use crate::store::{KeyValueStore, BACKUP_KEY};
use crate::{GpsPoint, Lifecycle, Result, RoutePoint, TrackerConfig};

/// Serializable mirror of a [`TrackingSession`] plus lifecycle flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub route_log: Vec<RoutePoint>,
    #[serde(default)]
    pub path_points: Vec<GpsPoint>,
    pub total_distance_km: f64,
    pub elapsed_ms: i64,
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    pub backup_time_ms: i64,
    #[serde(default)]
    pub is_tracking: bool,
    #[serde(default)]
    pub is_paused: bool,
}

impl BackupSnapshot {
    pub fn capture(session: &TrackingSession, lifecycle: Lifecycle, now_ms: i64) -> Self {
        Self {
            route_log: session.route_log().to_vec(),
            path_points: session.path_points().to_vec(),
            total_distance_km: session.total_distance_km(),
            elapsed_ms: session.elapsed_ms(),
            started_at_ms: session.started_at_ms(),
            backup_time_ms: now_ms,
            is_tracking: matches!(lifecycle, Lifecycle::Tracking | Lifecycle::Paused),
            is_paused: lifecycle == Lifecycle::Paused,
        }
    }

    /// Path to redraw: the stored path points, or the location points of
    /// the route log when the path was not stored.
    fn effective_path(&self) -> Vec<GpsPoint> {
        if !self.path_points.is_empty() {
            return self.path_points.clone();
        }
        self.route_log.iter().filter_map(RoutePoint::coords).collect()
    }
}

/// Owns the backup slot and the backup timer.
pub struct BackupManager {
    store: Arc<dyn KeyValueStore>,
    timer: Arc<dyn TimerService>,
    interval_ms: u64,
    max_age_ms: i64,
    active_timer: Option<TimerHandle>,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        timer: Arc<dyn TimerService>,
        config: &TrackerConfig,
    ) -> Self {
        Self {
            store,
            timer,
            interval_ms: config.backup_interval_ms,
            max_age_ms: config.backup_max_age_ms,
            active_timer: None,
        }
    }

    // ========================================================================
    // Timer
    // ========================================================================

    /// Start a fresh backup timer, cancelling any previous one.
    pub fn start_timer(&mut self) {
        self.stop_timer();
        let handle = self.timer.schedule_repeating(self.interval_ms);
        debug!("[BackupManager] Backup timer {} started", handle);
        self.active_timer = Some(handle);
    }

    pub fn stop_timer(&mut self) {
        if let Some(handle) = self.active_timer.take() {
            self.timer.cancel(handle);
            debug!("[BackupManager] Backup timer {} stopped", handle);
        }
    }

    pub fn is_timer_running(&self) -> bool {
        self.active_timer.is_some()
    }

    /// Whether `handle` is the live backup timer.
    pub fn owns_timer(&self, handle: TimerHandle) -> bool {
        self.active_timer == Some(handle)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Write a snapshot of `session`. Empty routes are not written.
    ///
    /// Returns whether a snapshot was written.
    pub fn write_snapshot(
        &self,
        session: &TrackingSession,
        lifecycle: Lifecycle,
        now_ms: i64,
    ) -> Result<bool> {
        if session.is_empty() {
            return Ok(false);
        }
        let snapshot = BackupSnapshot::capture(session, lifecycle, now_ms);
        let json = serde_json::to_string(&snapshot)?;
        self.store.set(BACKUP_KEY, &json)?;
        debug!(
            "[BackupManager] Snapshot written ({} points, {:.3} km)",
            snapshot.route_log.len(),
            snapshot.total_distance_km
        );
        Ok(true)
    }

    /// Inspect the backup slot at startup.
    ///
    /// Missing, unreadable, corrupt, stale (older than the configured max
    /// age) and empty snapshots are never offered; all but a missing one are
    /// removed from the slot.
    pub fn check_for_unsaved_route(&self, now_ms: i64) -> Option<BackupSnapshot> {
        let raw = match self.store.get(BACKUP_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("[BackupManager] Failed to read backup slot: {}", e);
                return None;
            }
        };

        let snapshot: BackupSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("[BackupManager] Discarding corrupt snapshot: {}", e);
                self.discard_slot();
                return None;
            }
        };

        let age_ms = now_ms - snapshot.backup_time_ms;
        if age_ms > self.max_age_ms {
            info!(
                "[BackupManager] Discarding stale snapshot ({} h old)",
                age_ms / 3_600_000
            );
            self.discard_slot();
            return None;
        }

        if snapshot.route_log.is_empty() {
            info!("[BackupManager] Discarding empty snapshot");
            self.discard_slot();
            return None;
        }

        info!(
            "[BackupManager] Found unsaved route ({} points)",
            snapshot.route_log.len()
        );
        Some(snapshot)
    }

    /// Rebuild a session from `snapshot` and redraw it.
    ///
    /// The snapshot's lifecycle flags are ignored: a restored route is never
    /// resumed automatically. Segments are drawn in recorded order, then the
    /// marker is placed at the final point.
    pub fn restore_from_backup(
        &self,
        snapshot: BackupSnapshot,
        map: &dyn MapRenderer,
    ) -> TrackingSession {
        let path = snapshot.effective_path();

        map.clear_route();
        for pair in path.windows(2) {
            map.add_route_segment(pair[0], pair[1]);
        }
        if let Some(last) = path.last() {
            map.update_marker_position(*last);
        }

        info!(
            "[BackupManager] Restored route ({} points, {:.2} km)",
            snapshot.route_log.len(),
            snapshot.total_distance_km
        );

        TrackingSession::from_parts(
            snapshot.route_log,
            path,
            snapshot.total_distance_km,
            snapshot.elapsed_ms,
            snapshot.started_at_ms,
        )
    }

    /// Remove the snapshot and stop the backup timer.
    pub fn clear_backup(&mut self) -> Result<()> {
        self.stop_timer();
        self.store.remove(BACKUP_KEY)?;
        debug!("[BackupManager] Backup cleared");
        Ok(())
    }

    fn discard_slot(&self) {
        if let Err(e) = self.store.remove(BACKUP_KEY) {
            warn!("[BackupManager] Failed to remove snapshot: {}", e);
        }
    }
}

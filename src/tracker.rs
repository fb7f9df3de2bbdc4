//! # Route Tracker
//!
//! The tracking state machine: `Idle -> Tracking <-> Paused`, and
//! `Tracking/Paused -> Stopped -> Idle`.
//!
//! The tracker exclusively owns the in-progress [`TrackingSession`]. Every
//! collaborator is injected through [`TrackerDeps`]; events flow in through
//! `on_fix`, `on_source_error` and `on_timer`, tagged with the handle of the
//! subscription or timer that produced them. Events carrying a handle that
//! is no longer live (a fix that was in flight when tracking paused, a tick
//! from a cancelled timer) are dropped.
//!
//! Execution is single-threaded: the tracker is `&mut` for every event, so
//! a backup snapshot always reflects state at a fix boundary.

use std::sync::Arc;

use chrono::{Local, TimeZone};
use log::{debug, info, warn};

use crate::backup::{BackupManager, BackupSnapshot};
use crate::clock::{Stopwatch, TimerHandle, TimerService};
use crate::filter::{FilterDecision, PositionFilter};
use crate::map::MapRenderer;
use crate::prompt::{DecisionSurface, Notice};
use crate::session::TrackingSession;
use crate::sessions::{SavedSession, SessionStore};
use crate::source::{PositionSource, SourceError, SubscriptionHandle};
use crate::store::KeyValueStore;
use crate::{
    AnnotationKind, Lifecycle, PositionFix, Result, RoutePoint, TrackerConfig, TrackerError,
};

const DISCARD_PROMPT: &str = "Are you sure you want to discard this route? All data will be lost!";
const NAME_PROMPT: &str = "Enter a name for this route:";
const RESTORE_PROMPT: &str = "Unsaved route found! Would you like to restore it?";

// ============================================================================
// Types
// ============================================================================

/// External collaborators, injected at construction.
#[derive(Clone)]
pub struct TrackerDeps {
    pub source: Arc<dyn PositionSource>,
    pub map: Arc<dyn MapRenderer>,
    pub store: Arc<dyn KeyValueStore>,
    pub surface: Arc<dyn DecisionSurface>,
    pub timer: Arc<dyn TimerService>,
}

/// What happened to a delivered fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    /// Committed to the route. `segment_km` is absent for the first point.
    Accepted { segment_km: Option<f64> },
    /// Refused by the position filter
    Rejected(FilterDecision),
    /// Not tracking, or the fix came from a cancelled subscription
    Ignored,
}

/// How the save-or-discard protocol ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(SavedSession),
    Discarded,
    /// Nothing was recorded; no prompt was shown
    Empty,
    /// The user neither saved nor confirmed a discard within the allowed
    /// rounds. The route stays in memory and in the backup slot.
    Deferred,
}

/// Result of the startup recovery check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    NothingToRestore,
    Restored { points: usize },
    Declined,
}

/// Snapshot of tracker progress for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStats {
    pub lifecycle: Lifecycle,
    pub total_distance_km: f64,
    pub elapsed_ms: i64,
    pub point_count: usize,
}

// ============================================================================
// Route Tracker
// ============================================================================

/// The tracking state machine.
pub struct RouteTracker {
    config: TrackerConfig,
    filter: PositionFilter,
    session: TrackingSession,
    lifecycle: Lifecycle,
    stopwatch: Stopwatch,

    /// Live position subscription (only while tracking)
    subscription: Option<SubscriptionHandle>,
    /// Live elapsed-time tick (only while tracking)
    clock_timer: Option<TimerHandle>,

    backups: BackupManager,
    sessions: SessionStore,
    /// Set after a failed snapshot write so the user is told once per streak
    backup_failing: bool,

    source: Arc<dyn PositionSource>,
    map: Arc<dyn MapRenderer>,
    surface: Arc<dyn DecisionSurface>,
    timer: Arc<dyn TimerService>,
}

impl RouteTracker {
    pub fn new(config: TrackerConfig, deps: TrackerDeps) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            filter: PositionFilter::from_config(&config),
            backups: BackupManager::new(deps.store.clone(), deps.timer.clone(), &config),
            sessions: SessionStore::new(deps.store),
            config,
            session: TrackingSession::new(),
            lifecycle: Lifecycle::Idle,
            stopwatch: Stopwatch::default(),
            subscription: None,
            clock_timer: None,
            backup_failing: false,
            source: deps.source,
            map: deps.map,
            surface: deps.surface,
            timer: deps.timer,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn stats(&self) -> TrackingStats {
        let elapsed_ms = if self.stopwatch.is_running() {
            self.stopwatch.elapsed_ms(self.timer.now_ms())
        } else {
            self.session.elapsed_ms()
        };
        TrackingStats {
            lifecycle: self.lifecycle,
            total_distance_km: self.session.total_distance_km(),
            elapsed_ms,
            point_count: self.session.route_log().len(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Whether an idle tracker still holds a route that was neither saved
    /// nor discarded (deferred at stop, or restored from a backup).
    pub fn has_unsaved_route(&self) -> bool {
        self.lifecycle == Lifecycle::Idle && !self.session.is_empty()
    }

    /// Begin a new route.
    ///
    /// Returns `Ok(false)` without side effects when not idle, or while an
    /// unsaved route is held; resolve that one with `prompt_save`, `save` or
    /// `discard` first.
    pub fn start(&mut self) -> Result<bool> {
        if self.lifecycle != Lifecycle::Idle {
            warn!("[RouteTracker] start ignored: already {}", self.lifecycle);
            return Ok(false);
        }
        if self.has_unsaved_route() {
            warn!(
                "[RouteTracker] start ignored: unsaved route with {} points pending",
                self.session.route_log().len()
            );
            return Ok(false);
        }
        if !self.source.is_available() {
            return Err(TrackerError::UnsupportedSource);
        }

        let handle = self.source.subscribe(&self.config.source)?;
        let now = self.timer.now_ms();

        self.session.clear();
        self.map.clear_route();
        self.session.set_started_at(now);
        self.subscription = Some(handle);

        self.stopwatch.reset();
        self.stopwatch.start(now);
        self.start_clock();

        self.lifecycle = Lifecycle::Tracking;
        self.backup_failing = false;
        self.backups.start_timer();

        info!("[RouteTracker] GPS tracking started");
        Ok(true)
    }

    /// Freeze tracking: the subscription and clocks stop, route data stays.
    pub fn pause(&mut self) -> Result<bool> {
        if self.lifecycle != Lifecycle::Tracking {
            warn!("[RouteTracker] pause ignored while {}", self.lifecycle);
            return Ok(false);
        }
        let now = self.timer.now_ms();
        self.release_subscription();
        self.stop_clock(now);
        self.backups.stop_timer();
        self.lifecycle = Lifecycle::Paused;

        self.write_backup(now);
        info!("[RouteTracker] Tracking paused");
        Ok(true)
    }

    /// Continue a paused route with a fresh subscription and timers.
    pub fn resume(&mut self) -> Result<bool> {
        if self.lifecycle != Lifecycle::Paused {
            warn!("[RouteTracker] resume ignored while {}", self.lifecycle);
            return Ok(false);
        }
        let handle = self.source.subscribe(&self.config.source)?;
        let now = self.timer.now_ms();

        self.subscription = Some(handle);
        self.stopwatch.start(now);
        self.start_clock();
        self.lifecycle = Lifecycle::Tracking;
        self.backups.start_timer();

        info!("[RouteTracker] Tracking resumed");
        Ok(true)
    }

    /// Pause when tracking, resume when paused; `Ok(false)` otherwise.
    pub fn toggle_pause(&mut self) -> Result<bool> {
        match self.lifecycle {
            Lifecycle::Tracking => self.pause(),
            Lifecycle::Paused => self.resume(),
            state => {
                warn!("[RouteTracker] Cannot pause - tracking not active ({})", state);
                Ok(false)
            }
        }
    }

    /// End the route and run the save-or-discard protocol.
    ///
    /// Returns `None` when there was nothing to stop. The subscription and
    /// clocks are cancelled before the first prompt is shown.
    pub async fn stop(&mut self) -> Option<SaveOutcome> {
        if !matches!(self.lifecycle, Lifecycle::Tracking | Lifecycle::Paused) {
            warn!("[RouteTracker] Tracking not active ({})", self.lifecycle);
            return None;
        }
        let now = self.timer.now_ms();
        self.release_subscription();
        self.stop_clock(now);
        self.backups.stop_timer();
        self.lifecycle = Lifecycle::Stopped;
        info!(
            "[RouteTracker] GPS tracking stopped ({} points, {:.2} km)",
            self.session.route_log().len(),
            self.session.total_distance_km()
        );

        // Keep the route recoverable while the user decides
        self.write_backup(now);

        let outcome = self.run_save_protocol().await;
        self.lifecycle = Lifecycle::Idle;
        Some(outcome)
    }

    /// Release the subscription and timers without prompting, leaving the
    /// backup slot as the only copy of an unfinished route.
    pub fn shutdown(&mut self) {
        let now = self.timer.now_ms();
        if matches!(self.lifecycle, Lifecycle::Tracking | Lifecycle::Paused) {
            self.stop_clock(now);
            self.write_backup(now);
        }
        self.release_subscription();
        self.stop_clock(now);
        self.backups.stop_timer();
        self.lifecycle = Lifecycle::Idle;
        info!("[RouteTracker] Shut down");
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Handle a fix from the position source.
    pub fn on_fix(&mut self, handle: SubscriptionHandle, fix: PositionFix) -> FixOutcome {
        if self.lifecycle != Lifecycle::Tracking || self.subscription != Some(handle) {
            debug!("[RouteTracker] Dropping fix from inactive subscription");
            return FixOutcome::Ignored;
        }

        let previous = self.session.last_accepted();
        let decision = self.filter.evaluate(&fix, previous);
        match decision {
            FilterDecision::Accept => {}
            FilterDecision::LowAccuracy { accuracy_m } => {
                warn!("[RouteTracker] GPS accuracy too low: {:.0}m", accuracy_m);
                return FixOutcome::Rejected(decision);
            }
            FilterDecision::Jitter { distance_km } => {
                debug!(
                    "[RouteTracker] Ignoring micro-movement of {:.1}m",
                    distance_km * 1000.0
                );
                return FixOutcome::Rejected(decision);
            }
            FilterDecision::InvalidCoordinates => {
                warn!("[RouteTracker] Ignoring fix with invalid coordinates");
                return FixOutcome::Rejected(decision);
            }
        }

        let now = self.timer.now_ms();
        let segment_km = self.session.commit_fix(fix.coords, fix.accuracy_m, now);
        if let Some(prev) = previous {
            self.map.add_route_segment(prev, fix.coords);
        }
        self.map.update_marker_position(fix.coords);

        debug!(
            "[RouteTracker] GPS: {:.6}, {:.6} (±{:.1}m), total {:.3} km",
            fix.coords.lat,
            fix.coords.lng,
            fix.accuracy_m,
            self.session.total_distance_km()
        );
        FixOutcome::Accepted { segment_km }
    }

    /// Handle an error from the position source.
    ///
    /// `PermissionDenied` stops tracking (running the save protocol, whose
    /// outcome is returned). Other errors are reported and tracking continues.
    pub async fn on_source_error(
        &mut self,
        handle: SubscriptionHandle,
        error: SourceError,
    ) -> Option<SaveOutcome> {
        if self.subscription != Some(handle) {
            debug!("[RouteTracker] Dropping error from inactive subscription");
            return None;
        }

        if error.is_fatal() {
            warn!("[RouteTracker] {} Stopping.", error);
            self.surface.notify(Notice::TrackingStopped(error));
            return self.stop().await;
        }

        warn!("[RouteTracker] {}", error);
        self.surface.notify(Notice::SourceWarning(error));
        None
    }

    /// Handle a timer tick. Returns whether the tick belonged to a live timer.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        let now = self.timer.now_ms();

        if self.clock_timer == Some(handle) {
            self.session.set_elapsed(self.stopwatch.elapsed_ms(now));
            return true;
        }

        if self.backups.owns_timer(handle) && self.lifecycle == Lifecycle::Tracking {
            self.session.set_elapsed(self.stopwatch.elapsed_ms(now));
            self.write_backup(now);
            return true;
        }

        debug!("[RouteTracker] Ignoring tick from cancelled {}", handle);
        false
    }

    /// Append a photo or text point to the current route.
    pub fn add_annotation(&mut self, kind: AnnotationKind, content: impl Into<String>) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Tracking | Lifecycle::Paused) {
            return Err(TrackerError::InvalidTransition {
                operation: "add an annotation",
                state: self.lifecycle,
            });
        }
        let now = self.timer.now_ms();
        self.session
            .push_annotation(RoutePoint::annotation(kind, content.into(), now));
        Ok(())
    }

    // ========================================================================
    // Save / discard
    // ========================================================================

    /// Save the current route under `name` and clear it.
    pub fn save(&mut self, name: &str) -> Result<SavedSession> {
        if matches!(self.lifecycle, Lifecycle::Tracking | Lifecycle::Paused) {
            return Err(TrackerError::InvalidTransition {
                operation: "save",
                state: self.lifecycle,
            });
        }
        let saved = self.sessions.save(name, &self.session, self.timer.now_ms())?;
        self.clear_route();
        Ok(saved)
    }

    /// Drop the current route and its snapshot.
    pub fn discard(&mut self) -> Result<()> {
        if matches!(self.lifecycle, Lifecycle::Tracking | Lifecycle::Paused) {
            return Err(TrackerError::InvalidTransition {
                operation: "discard",
                state: self.lifecycle,
            });
        }
        self.session.clear();
        self.map.clear_route();
        self.backups.clear_backup()?;
        info!("[RouteTracker] Route data discarded");
        Ok(())
    }

    /// Run the save-or-discard protocol on an idle route (for example a
    /// restored one, or one deferred earlier).
    pub async fn prompt_save(&mut self) -> Result<SaveOutcome> {
        self.require_idle("prompt for save")?;
        Ok(self.run_save_protocol().await)
    }

    async fn run_save_protocol(&mut self) -> SaveOutcome {
        if self.session.is_empty() {
            info!("[RouteTracker] No route data to save");
            return SaveOutcome::Empty;
        }

        for round in 1..=self.config.max_save_prompts {
            let summary = self.session.summary().to_string();
            if self.surface.confirm(&summary).await {
                if let Some(saved) = self.save_flow().await {
                    return SaveOutcome::Saved(saved);
                }
                continue;
            }

            if self.surface.confirm(DISCARD_PROMPT).await {
                if let Err(e) = self.discard() {
                    warn!("[RouteTracker] Route discarded but backup not cleared: {}", e);
                }
                self.surface.notify(Notice::Discarded);
                return SaveOutcome::Discarded;
            }
            debug!("[RouteTracker] Discard declined, offering save again (round {})", round);
        }

        warn!(
            "[RouteTracker] No decision after {} rounds, keeping route as unsaved",
            self.config.max_save_prompts
        );
        let now = self.timer.now_ms();
        self.write_backup(now);
        self.surface.notify(Notice::RouteRetained);
        SaveOutcome::Deferred
    }

    /// Ask for a name and save. `None` when cancelled or when saving failed.
    async fn save_flow(&mut self) -> Option<SavedSession> {
        let default_name = self.default_route_name();

        let name = match self.surface.prompt_text(NAME_PROMPT, &default_name).await {
            Some(name) => name,
            None => {
                let question = format!("Use default name \"{default_name}\"?");
                if !self.surface.confirm(&question).await {
                    info!("[RouteTracker] Route save cancelled by user");
                    return None;
                }
                default_name
            }
        };

        match self.save(&name) {
            Ok(saved) => {
                self.surface.notify(Notice::Saved {
                    name: saved.name.clone(),
                });
                Some(saved)
            }
            Err(e) => {
                warn!("[RouteTracker] Failed to save route: {}", e);
                self.surface.notify(Notice::SaveFailed {
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn default_route_name(&self) -> String {
        let now = self.timer.now_ms();
        match Local.timestamp_millis_opt(now).single() {
            Some(at) => format!("Route {}", at.format("%Y-%m-%d %H:%M")),
            None => format!("Route {now}"),
        }
    }

    // ========================================================================
    // Crash recovery
    // ========================================================================

    /// A fresh, non-empty snapshot left by an earlier run, if any.
    pub fn check_for_unsaved_route(&self) -> Option<BackupSnapshot> {
        self.backups.check_for_unsaved_route(self.timer.now_ms())
    }

    /// Load `snapshot` as the current route. The tracker stays idle.
    pub fn restore_from_backup(&mut self, snapshot: BackupSnapshot) -> Result<()> {
        self.require_idle("restore a backup")?;
        self.session = self.backups.restore_from_backup(snapshot, self.map.as_ref());
        self.stopwatch = Stopwatch::with_elapsed(self.session.elapsed_ms());
        Ok(())
    }

    /// Drop the snapshot. Only while idle: the slot of a live route is
    /// owned by the backup timer.
    pub fn clear_backup(&mut self) -> Result<()> {
        self.require_idle("clear the backup")?;
        self.backups.clear_backup()
    }

    /// Startup check: offer an unsaved route and restore or drop it.
    pub async fn recover_on_startup(&mut self) -> Result<RecoveryOutcome> {
        self.require_idle("recover a backup")?;
        let Some(snapshot) = self.check_for_unsaved_route() else {
            return Ok(RecoveryOutcome::NothingToRestore);
        };

        if self.surface.confirm(RESTORE_PROMPT).await {
            let points = snapshot.route_log.len();
            self.restore_from_backup(snapshot)?;
            info!("[RouteTracker] Restored from backup");
            Ok(RecoveryOutcome::Restored { points })
        } else {
            self.clear_backup()?;
            Ok(RecoveryOutcome::Declined)
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn require_idle(&self, operation: &'static str) -> Result<()> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(TrackerError::InvalidTransition {
                operation,
                state: self.lifecycle,
            });
        }
        Ok(())
    }

    fn release_subscription(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.source.unsubscribe(handle);
        }
    }

    fn start_clock(&mut self) {
        if let Some(old) = self.clock_timer.take() {
            self.timer.cancel(old);
        }
        self.clock_timer = Some(self.timer.schedule_repeating(self.config.clock_tick_ms));
    }

    fn stop_clock(&mut self, now: i64) {
        if let Some(handle) = self.clock_timer.take() {
            self.timer.cancel(handle);
        }
        self.stopwatch.pause(now);
        self.session.set_elapsed(self.stopwatch.elapsed_ms(now));
    }

    fn clear_route(&mut self) {
        self.session.clear();
        self.map.clear_route();
        if let Err(e) = self.backups.clear_backup() {
            warn!("[RouteTracker] Failed to clear backup: {}", e);
        }
    }

    /// Best-effort snapshot; failures are logged and reported, never raised.
    fn write_backup(&mut self, now: i64) {
        match self.backups.write_snapshot(&self.session, self.lifecycle, now) {
            Ok(_) => self.backup_failing = false,
            Err(e) => {
                warn!("[RouteTracker] Auto-save failed: {}", e);
                if !self.backup_failing {
                    self.surface.notify(Notice::BackupFailed {
                        message: e.to_string(),
                    });
                }
                self.backup_failing = true;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

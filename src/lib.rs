//! # Trail Tracker
//!
//! Route-tracking engine for a trail-logging client.
//!
//! This library provides:
//! - Accuracy and movement filtering of raw GPS fixes
//! - Great-circle distance accumulation along the accepted route
//! - A start/pause/resume/stop tracking lifecycle with a save-or-discard protocol
//! - Crash-safe snapshots of the in-progress route and restore at startup
//! - An append-only archive of named, finished sessions
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed durable key-value store (default)
//! - **`runtime`** - Tokio event loop and timer service (default)
//! - **`testing`** - In-memory collaborators (`ManualClock`, `MockPositionSource`, ...)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_tracker::{GpsPoint, PositionFilter, PositionFix, FilterDecision};
//!
//! let filter = PositionFilter::default();
//! let fix = PositionFix::new(32.0010, 34.0000, 10.0);
//!
//! let decision = filter.evaluate(&fix, Some(GpsPoint::new(32.0000, 34.0000)));
//! assert_eq!(decision, FilterDecision::Accept);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, StorageError, TrackerError};

// Engine configuration
pub mod config;
pub use config::TrackerConfig;

// Haversine distance and the running distance total
pub mod distance;
pub use distance::{haversine_km, DistanceAccumulator, EARTH_RADIUS_KM};

// Accuracy and movement gates
pub mod filter;
pub use filter::{FilterDecision, PositionFilter};

// In-progress route state
pub mod session;
pub use session::{format_duration, RouteSummary, TrackingSession};

// External collaborator contracts
pub mod clock;
pub use clock::{Stopwatch, SystemClock, TimerHandle, TimerService};

pub mod source;
pub use source::{PositionSource, SourceError, SourceOptions, SubscriptionHandle};

pub mod map;
pub use map::{MapRenderer, NullMap};

pub mod prompt;
pub use prompt::{DecisionSurface, Notice};

// Durable key-value storage
pub mod store;
pub use store::{KeyValueStore, MemoryStore, BACKUP_KEY, SESSIONS_KEY};
#[cfg(feature = "persistence")]
pub use store::SqliteStore;

// Archive of finished sessions
pub mod sessions;
pub use sessions::{SavedSession, SessionStore};

// Crash snapshots
pub mod backup;
pub use backup::{BackupManager, BackupSnapshot};

// Tracking state machine
pub mod tracker;
pub use tracker::{
    FixOutcome, RecoveryOutcome, RouteTracker, SaveOutcome, TrackerDeps, TrackingStats,
};

// Tokio event loop
#[cfg(feature = "runtime")]
pub mod driver;
#[cfg(feature = "runtime")]
pub use driver::{run, TokioTimer, TrackerCommand, TrackerEvent};

// In-memory collaborators for tests and simulations
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS-84 coordinate in degrees.
///
/// Serialized as `{"lat": .., "lng": ..}`, which is the stored record shape.
///
/// # Example
/// ```
/// use trail_tracker::GpsPoint;
/// let point = GpsPoint::new(32.0853, 34.7818); // Tel Aviv
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// A raw position reading delivered by the position source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub coords: GpsPoint,
    /// Accuracy radius in meters
    pub accuracy_m: f64,
}

impl PositionFix {
    pub fn new(lat: f64, lng: f64, accuracy_m: f64) -> Self {
        Self {
            coords: GpsPoint::new(lat, lng),
            accuracy_m,
        }
    }
}

/// Kind of a user-authored route annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Photo,
    Text,
}

/// One entry in a session's timeline.
///
/// Location points are produced by the tracker; photo and text points are
/// authored elsewhere and passed through unchanged. Serialized with a
/// `kind` tag: `{"kind": "location", "coords": {..}, "timestamp": .., "accuracy": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoutePoint {
    Location {
        coords: GpsPoint,
        /// Epoch milliseconds
        timestamp: i64,
        /// Meters
        accuracy: f64,
    },
    Photo { content: String, timestamp: i64 },
    Text { content: String, timestamp: i64 },
}

impl RoutePoint {
    pub fn timestamp(&self) -> i64 {
        match self {
            RoutePoint::Location { timestamp, .. }
            | RoutePoint::Photo { timestamp, .. }
            | RoutePoint::Text { timestamp, .. } => *timestamp,
        }
    }

    /// Coordinates of a location point, `None` for annotations.
    pub fn coords(&self) -> Option<GpsPoint> {
        match self {
            RoutePoint::Location { coords, .. } => Some(*coords),
            _ => None,
        }
    }

    pub(crate) fn annotation(kind: AnnotationKind, content: String, timestamp: i64) -> Self {
        match kind {
            AnnotationKind::Photo => RoutePoint::Photo { content, timestamp },
            AnnotationKind::Text => RoutePoint::Text { content, timestamp },
        }
    }
}

/// Lifecycle of the tracking state machine.
///
/// `Stopped` is transient: it is only observable while the save-or-discard
/// protocol runs after `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Tracking,
    Paused,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Tracking => "tracking",
            Lifecycle::Paused => "paused",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! # Tracking Session
//!
//! Working state of the current, not-yet-saved route.

use std::fmt;

use crate::distance::DistanceAccumulator;
use crate::{GpsPoint, RoutePoint};

/// In-memory state of the route being recorded.
///
/// The route log is append-only for the lifetime of a session; it is only
/// emptied by [`clear`](Self::clear).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSession {
    route_log: Vec<RoutePoint>,
    /// One entry per accepted location fix, kept apart from the route log
    /// because the log interleaves photo and text points.
    path_points: Vec<GpsPoint>,
    distance: DistanceAccumulator,
    elapsed_ms: i64,
    started_at_ms: Option<i64>,
    last_accepted: Option<GpsPoint>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session from persisted fields. `last_accepted` is derived
    /// from the final path point.
    pub fn from_parts(
        route_log: Vec<RoutePoint>,
        path_points: Vec<GpsPoint>,
        total_distance_km: f64,
        elapsed_ms: i64,
        started_at_ms: Option<i64>,
    ) -> Self {
        let last_accepted = path_points.last().copied();
        Self {
            route_log,
            path_points,
            distance: DistanceAccumulator::with_total(total_distance_km),
            elapsed_ms: elapsed_ms.max(0),
            started_at_ms,
            last_accepted,
        }
    }

    pub fn route_log(&self) -> &[RoutePoint] {
        &self.route_log
    }

    pub fn path_points(&self) -> &[GpsPoint] {
        &self.path_points
    }

    pub fn total_distance_km(&self) -> f64 {
        self.distance.total_km()
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed_ms
    }

    pub fn started_at_ms(&self) -> Option<i64> {
        self.started_at_ms
    }

    pub fn last_accepted(&self) -> Option<GpsPoint> {
        self.last_accepted
    }

    pub fn is_empty(&self) -> bool {
        self.route_log.is_empty()
    }

    /// Commit an accepted fix: extends the distance total from the previous
    /// accepted point, appends a location point and a path point.
    ///
    /// Returns the length of the new segment, if there was a previous point.
    pub fn commit_fix(&mut self, coords: GpsPoint, accuracy_m: f64, timestamp: i64) -> Option<f64> {
        let segment = self
            .last_accepted
            .map(|prev| self.distance.add_segment(&prev, &coords));

        self.route_log.push(RoutePoint::Location {
            coords,
            timestamp,
            accuracy: accuracy_m,
        });
        self.path_points.push(coords);
        self.last_accepted = Some(coords);
        segment
    }

    /// Append a photo/text point unchanged.
    pub fn push_annotation(&mut self, point: RoutePoint) {
        self.route_log.push(point);
    }

    pub(crate) fn set_started_at(&mut self, started_at_ms: i64) {
        self.started_at_ms = Some(started_at_ms);
    }

    pub(crate) fn set_elapsed(&mut self, elapsed_ms: i64) {
        self.elapsed_ms = elapsed_ms.max(0);
    }

    /// Drop all route data.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn summary(&self) -> RouteSummary {
        let mut summary = RouteSummary {
            location_points: 0,
            photos: 0,
            notes: 0,
            distance_km: self.total_distance_km(),
            elapsed_ms: self.elapsed_ms,
        };
        for point in &self.route_log {
            match point {
                RoutePoint::Location { .. } => summary.location_points += 1,
                RoutePoint::Photo { .. } => summary.photos += 1,
                RoutePoint::Text { .. } => summary.notes += 1,
            }
        }
        summary
    }
}

/// Point counts and totals shown before the save prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteSummary {
    pub location_points: usize,
    pub photos: usize,
    pub notes: usize,
    pub distance_km: f64,
    pub elapsed_ms: i64,
}

impl fmt::Display for RouteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Route Summary:")?;
        writeln!(f, "GPS Points: {}", self.location_points)?;
        writeln!(f, "Distance: {:.2} km", self.distance_km)?;
        writeln!(f, "Duration: {}", format_duration(self.elapsed_ms))?;
        writeln!(f, "Photos: {}", self.photos)?;
        writeln!(f, "Notes: {}", self.notes)?;
        writeln!(f)?;
        write!(f, "Would you like to save this route?")
    }
}

/// Format a duration as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(milliseconds: i64) -> String {
    let total_seconds = milliseconds.max(0) / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::haversine_km;

    #[test]
    fn test_commit_fix_tracks_distance() {
        let mut session = TrackingSession::new();
        let a = GpsPoint::new(32.0, 34.0);
        let b = GpsPoint::new(32.001, 34.0);

        assert_eq!(session.commit_fix(a, 10.0, 1), None);
        let seg = session.commit_fix(b, 10.0, 2).unwrap();

        assert!((seg - haversine_km(&a, &b)).abs() < 1e-12);
        assert_eq!(session.total_distance_km(), seg);
        assert_eq!(session.path_points(), &[a, b]);
        assert_eq!(session.last_accepted(), Some(b));
        assert_eq!(session.route_log().len(), 2);
    }

    #[test]
    fn test_annotations_do_not_touch_path() {
        let mut session = TrackingSession::new();
        session.commit_fix(GpsPoint::new(32.0, 34.0), 10.0, 1);
        session.push_annotation(RoutePoint::Text {
            content: "trailhead".to_string(),
            timestamp: 2,
        });
        session.push_annotation(RoutePoint::Photo {
            content: "img-001.jpg".to_string(),
            timestamp: 3,
        });

        assert_eq!(session.route_log().len(), 3);
        assert_eq!(session.path_points().len(), 1);

        let summary = session.summary();
        assert_eq!(summary.location_points, 1);
        assert_eq!(summary.photos, 1);
        assert_eq!(summary.notes, 1);
    }

    #[test]
    fn test_from_parts_derives_last_accepted() {
        let path = vec![GpsPoint::new(1.0, 1.0), GpsPoint::new(1.001, 1.0)];
        let session = TrackingSession::from_parts(Vec::new(), path.clone(), 0.11, 5_000, Some(10));
        assert_eq!(session.last_accepted(), Some(path[1]));
        assert_eq!(session.total_distance_km(), 0.11);
        assert_eq!(session.elapsed_ms(), 5_000);
    }

    #[test]
    fn test_clear() {
        let mut session = TrackingSession::new();
        session.set_started_at(100);
        session.commit_fix(GpsPoint::new(32.0, 34.0), 10.0, 1);
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.started_at_ms(), None);
        assert_eq!(session.last_accepted(), None);
        assert_eq!(session.total_distance_km(), 0.0);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59_999), "59s");
        assert_eq!(format_duration(61_000), "1m 1s");
        assert_eq!(format_duration(3_723_000), "1h 2m 3s");
    }

    #[test]
    fn test_summary_text() {
        let summary = RouteSummary {
            location_points: 12,
            photos: 2,
            notes: 0,
            distance_km: 1.234,
            elapsed_ms: 90_000,
        };
        let text = summary.to_string();
        assert!(text.contains("GPS Points: 12"));
        assert!(text.contains("Distance: 1.23 km"));
        assert!(text.contains("Duration: 1m 30s"));
        assert!(text.ends_with("save this route?"));
    }
}

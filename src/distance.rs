//! # Distance Accumulation
//!
//! Great-circle distance between fixes and the running route total.

use crate::GpsPoint;

/// Mean Earth radius used for all route distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two points, in kilometers.
///
/// Identical points yield exactly 0.
///
/// # Example
/// ```
/// use trail_tracker::{haversine_km, GpsPoint};
/// let a = GpsPoint::new(32.0000, 34.0000);
/// let b = GpsPoint::new(32.0010, 34.0000);
/// assert!((haversine_km(&a, &b) - 0.1112).abs() < 0.001);
/// ```
pub fn haversine_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.lat.to_radians();
    let phi2 = p2.lat.to_radians();
    let delta_phi = (p2.lat - p1.lat).to_radians();
    let delta_lambda = (p2.lng - p1.lng).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Running distance total for the current route.
///
/// The total only grows through [`add_segment`](Self::add_segment) and only
/// shrinks through [`reset`](Self::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistanceAccumulator {
    total_km: f64,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously recorded total (restored snapshots).
    pub fn with_total(total_km: f64) -> Self {
        Self {
            total_km: if total_km.is_finite() && total_km > 0.0 {
                total_km
            } else {
                0.0
            },
        }
    }

    /// Add the segment `prev -> curr` and return its length in kilometers.
    pub fn add_segment(&mut self, prev: &GpsPoint, curr: &GpsPoint) -> f64 {
        let segment = haversine_km(prev, curr);
        // NaN from invalid input must not poison the total
        if segment.is_finite() && segment > 0.0 {
            self.total_km += segment;
            segment
        } else {
            0.0
        }
    }

    pub fn total_km(&self) -> f64 {
        self.total_km
    }

    pub fn reset(&mut self) {
        self.total_km = 0.0;
    }
}

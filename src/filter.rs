//! # Position Filter
//!
//! Decides whether a raw fix may affect route state. Filtering is a pure
//! function of the fix, the last accepted point and the thresholds; the
//! filter keeps no state between calls.

use crate::distance::haversine_km;
use crate::{GpsPoint, PositionFix, TrackerConfig};

/// Outcome of running a fix through the gates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    /// The fix becomes the new last accepted point
    Accept,
    /// Accuracy radius above the limit (or not a number)
    LowAccuracy { accuracy_m: f64 },
    /// Closer than the movement threshold to the previous accepted point
    Jitter { distance_km: f64 },
    /// Coordinates outside the WGS-84 range
    InvalidCoordinates,
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// Accuracy gate followed by a movement gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFilter {
    max_accuracy_m: f64,
    min_movement_km: f64,
}

impl Default for PositionFilter {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

impl PositionFilter {
    pub fn new(max_accuracy_m: f64, min_movement_km: f64) -> Self {
        Self {
            max_accuracy_m,
            min_movement_km,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.max_accuracy_m, config.min_movement_km)
    }

    /// Run `fix` through the gates against the last accepted point.
    pub fn evaluate(&self, fix: &PositionFix, last_accepted: Option<GpsPoint>) -> FilterDecision {
        if !fix.coords.is_valid() {
            return FilterDecision::InvalidCoordinates;
        }

        // Written so that a NaN accuracy fails the gate
        if !(fix.accuracy_m <= self.max_accuracy_m) {
            return FilterDecision::LowAccuracy {
                accuracy_m: fix.accuracy_m,
            };
        }

        match last_accepted {
            None => FilterDecision::Accept,
            Some(prev) => {
                let distance_km = haversine_km(&prev, &fix.coords);
                if distance_km < self.min_movement_km {
                    FilterDecision::Jitter { distance_km }
                } else {
                    FilterDecision::Accept
                }
            }
        }
    }
}

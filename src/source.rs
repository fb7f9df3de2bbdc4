//! Position source contract.

use std::fmt;

use serde::Deserialize;

use crate::Result;

/// Identifies one subscription to the position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Options passed on every subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    pub high_accuracy: bool,
    /// Maximum age of a cached fix; 0 disables the cache
    pub max_fix_age_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_fix_age_ms: 0,
            timeout_ms: 15_000,
        }
    }
}

/// Errors reported by the position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    PermissionDenied,
    Unavailable,
    Timeout,
    Unknown,
}

impl SourceError {
    /// Fatal errors end the current session; the rest are warnings.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::PermissionDenied)
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            SourceError::PermissionDenied => {
                "Location permission denied. Please enable location access and try again."
            }
            SourceError::Unavailable => {
                "Location information unavailable. Please check your GPS settings."
            }
            SourceError::Timeout => "Location request timed out.",
            SourceError::Unknown => "An unknown error occurred.",
        };
        write!(f, "GPS error: {message}")
    }
}

impl std::error::Error for SourceError {}

/// A continuous stream of geolocation fixes.
///
/// Fixes and errors for a subscription are delivered to the tracker through
/// `RouteTracker::on_fix` / `RouteTracker::on_source_error`, tagged with the
/// handle returned here.
pub trait PositionSource: Send + Sync {
    /// Whether the device has a position source at all.
    fn is_available(&self) -> bool;

    fn subscribe(&self, options: &SourceOptions) -> Result<SubscriptionHandle>;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_permission_denied_is_fatal() {
        assert!(SourceError::PermissionDenied.is_fatal());
        assert!(!SourceError::Unavailable.is_fatal());
        assert!(!SourceError::Timeout.is_fatal());
        assert!(!SourceError::Unknown.is_fatal());
    }

    #[test]
    fn test_error_message() {
        assert!(SourceError::PermissionDenied
            .to_string()
            .starts_with("GPS error: Location permission denied"));
    }
}

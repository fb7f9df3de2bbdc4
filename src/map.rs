//! Map renderer contract (outbound notifications only).

use crate::GpsPoint;

/// Display-only consumer of committed route segments and the position marker.
pub trait MapRenderer: Send + Sync {
    fn add_route_segment(&self, from: GpsPoint, to: GpsPoint);

    fn update_marker_position(&self, at: GpsPoint);

    fn clear_route(&self);
}

/// Renderer that draws nothing, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMap;

impl MapRenderer for NullMap {
    fn add_route_segment(&self, _from: GpsPoint, _to: GpsPoint) {}

    fn update_marker_position(&self, _at: GpsPoint) {}

    fn clear_route(&self) {}
}

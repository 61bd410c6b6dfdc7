use crate::geo::{self, GeoPoint};

/// Fixes closer than this carry no usable direction of travel.
pub const MIN_BASELINE_M: f64 = 0.001;

/// Two consecutive accepted fixes; the bearing between them is the rover's heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingSample {
    pub previous: GeoPoint,
    pub current: GeoPoint,
}

impl HeadingSample {
    pub fn new(previous: GeoPoint, current: GeoPoint) -> Self {
        Self { previous, current }
    }

    pub fn heading(&self) -> Option<f64> {
        estimate_heading(self.previous, self.current)
    }
}

/// Bearing of travel from `previous` to `current`, or `None` when the rover has not moved.
pub fn estimate_heading(previous: GeoPoint, current: GeoPoint) -> Option<f64> {
    if geo::distance(previous, current) < MIN_BASELINE_M {
        return None;
    }
    Some(geo::bearing(previous, current))
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::normalize_deg;

pub const DEFAULT_TOLERANCE_DEG: f64 = 10.0;
pub const DEFAULT_SHARP_TURN_DEG: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementDecision {
    Forward,
    Left,
    Right,
    SharpLeft,
    SharpRight,
}

impl MovementDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDecision::Forward => "forward",
            MovementDecision::Left => "left",
            MovementDecision::Right => "right",
            MovementDecision::SharpLeft => "sharp_left",
            MovementDecision::SharpRight => "sharp_right",
        }
    }

    pub fn is_turn(&self) -> bool {
        !matches!(self, MovementDecision::Forward)
    }
}

impl fmt::Display for MovementDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shortest signed rotation from `current` to `target` in (-180, 180]; positive turns right.
pub fn heading_error(current: f64, target: f64) -> f64 {
    let e = (normalize_deg(target) - normalize_deg(current) + 180.0).rem_euclid(360.0) - 180.0;
    if e <= -180.0 { e + 360.0 } else { e }
}

/// Deadband and sharp-turn tiers for [`MovementDecision`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionParams {
    pub tolerance_deg: f64,
    pub sharp_turn_deg: f64,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self { tolerance_deg: DEFAULT_TOLERANCE_DEG, sharp_turn_deg: DEFAULT_SHARP_TURN_DEG }
    }
}

impl DecisionParams {
    pub fn decide(&self, current_heading: f64, target_bearing: f64) -> MovementDecision {
        let e = heading_error(current_heading, target_bearing);
        let mag = e.abs();
        if mag <= self.tolerance_deg {
            MovementDecision::Forward
        } else if e > 0.0 {
            if mag <= self.sharp_turn_deg { MovementDecision::Right } else { MovementDecision::SharpRight }
        } else if mag <= self.sharp_turn_deg {
            MovementDecision::Left
        } else {
            MovementDecision::SharpLeft
        }
    }
}

/// Map heading error onto a movement using the default 45 degree sharp-turn tier.
pub fn decide(current_heading: f64, target_bearing: f64, tolerance_deg: f64) -> MovementDecision {
    DecisionParams { tolerance_deg, ..DecisionParams::default() }.decide(current_heading, target_bearing)
}

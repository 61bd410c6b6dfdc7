use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First fix stored, no heading yet.
    AwaitingFix,
    Cycle,
    WaypointReached,
    TagSeen,
    Degraded,
    Complete,
    Aborted,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub waypoint_index: usize,
    pub waypoint_count: usize,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub distance_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub bearing_deg: Option<f64>,
    // snake_case decision name, e.g. "sharp_left"
    pub decision: Option<String>,
    pub tag: Option<u32>,
    pub fix_failures: u32,
    pub msg: String,
}

impl NavEvent {
    pub fn new(ts_unix_ms: i64, kind: EventKind, waypoint_index: usize, waypoint_count: usize) -> Self {
        Self {
            ts_unix_ms,
            kind,
            waypoint_index,
            waypoint_count,
            lat: None,
            lon: None,
            distance_m: None,
            heading_deg: None,
            bearing_deg: None,
            decision: None,
            tag: None,
            fix_failures: 0,
            msg: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Complete | EventKind::Aborted | EventKind::Cancelled)
    }
}

pub mod debounce;
pub mod replay;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker identifier as decoded by the detector. Only equality is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagConfig {
    pub enable: bool,
    /// Consecutive identical reads before a tag counts as confirmed.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Tags are only queried once the rover is this close to the waypoint.
    #[serde(default = "default_proximity_m")]
    pub proximity_m: f64,
    #[serde(default = "default_source")]
    pub source: String, // "replay"
    pub replay_file: Option<String>,
}

fn default_threshold() -> u32 { 3 }
fn default_proximity_m() -> f64 { 2.5 }
fn default_source() -> String { "replay".into() }

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            enable: false,
            threshold: default_threshold(),
            proximity_m: default_proximity_m(),
            source: default_source(),
            replay_file: None,
        }
    }
}

/// One call per navigation cycle. `Ok(None)` means nothing was seen this frame.
pub trait TagDetector: Send {
    fn read(&mut self) -> Result<Option<TagId>>;

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

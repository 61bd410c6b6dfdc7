use thiserror::Error;

/// Faults that must be reported before the rover is allowed to move.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("coordinate out of range: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("mission {0} contains no usable waypoints")]
    EmptyMission(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

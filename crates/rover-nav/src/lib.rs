pub mod actuator;
pub mod decision;
pub mod doctor;
pub mod error;
pub mod geo;
pub mod gnss;
pub mod heading;
pub mod mission;
pub mod nav;
pub mod signal;

pub use error::NavError;
pub use geo::GeoPoint;

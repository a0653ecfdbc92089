//! Trail navigation engine.
//!
//! Matches a stream of GPS fixes against a recorded path, tracks whether
//! the hiker is on or off the trail, steers a direction indicator, can
//! reroute toward a companion in distress and projects nearby companions
//! onto a heading-relative radar.

pub mod android_jni;
pub mod bearing;
pub mod companion;
pub mod config;
pub mod error;
pub mod geo;
pub mod gpx;
pub mod matcher;
pub mod path;
pub mod radar;
pub mod reroute;
pub mod session;
pub mod track_state;

pub use config::{NavConfig, RadarConfig};
pub use error::NavError;
pub use geo::GeoPoint;
pub use path::{Path, PathPoint};
pub use session::{Fix, NavSession, NavSnapshot};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

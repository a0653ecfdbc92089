//! Tunable engine constants.
//!
//! The thresholds below were tuned empirically against real hikes. They
//! are exposed as configuration so a host can adjust them without
//! touching the matcher, and load from JSON with every field optional.

use serde::{Deserialize, Serialize};

use crate::error::NavError;

/// Thresholds used by matching, off-track detection and steering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Deviation below which the hiker counts as near the path, in meters.
    pub near_threshold_m: f64,
    /// Distance under which a path point counts as passed, in meters.
    pub point_passed_threshold_m: f64,
    /// Number of nearest points considered on a cold start.
    pub cold_start_candidates: usize,
    /// Size of the trailing window that triggers the start bias on a cold start.
    pub cold_start_end_window: usize,
    /// Candidates below this index are preferred by the start bias.
    pub cold_start_index_cutoff: usize,
    /// Radius around the first path point treated as "near the start", in meters.
    pub loop_start_radius_m: f64,
    /// Fraction of the path after which points near the start are skipped.
    pub loop_skip_fraction: f64,
    /// Base snooze duration, multiplied per request, in milliseconds.
    pub snooze_base_ms: u64,
    /// How long the back-on-track signal stays raised, in milliseconds.
    pub on_again_display_ms: u64,
    /// Minimum steering change that gets published, in degrees.
    pub steering_jitter_deg: f64,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            near_threshold_m: 25.0,
            point_passed_threshold_m: 15.0,
            cold_start_candidates: 5,
            cold_start_end_window: 7,
            cold_start_index_cutoff: 5,
            loop_start_radius_m: 50.0,
            loop_skip_fraction: 2.0 / 3.0,
            snooze_base_ms: 60_000,
            on_again_display_ms: 3_000,
            steering_jitter_deg: 5.0,
        }
    }
}

impl NavConfig {
    /// Parse a config from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, NavError> {
        serde_json::from_str(json).map_err(|e| NavError::Config(e.to_string()))
    }
}

/// Geometry of the companion radar display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Radius of the radar disc in pixels.
    pub display_radius_px: f64,
    /// Distance mapped to the outer edge; anything farther is capped.
    pub max_range_m: f64,
    /// Projected markers closer than this are merged into one cluster.
    pub merge_distance_px: f64,
    /// Radius at which cluster members are fanned out around the centroid.
    pub spread_radius_px: f64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            display_radius_px: 150.0,
            max_range_m: 1_000.0,
            merge_distance_px: 24.0,
            spread_radius_px: 14.0,
        }
    }
}

impl RadarConfig {
    pub fn from_json(json: &str) -> Result<Self, NavError> {
        serde_json::from_str(json).map_err(|e| NavError::Config(e.to_string()))
    }
}

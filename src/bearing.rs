//! Steering angle for the direction indicator.
//!
//! Combines the compass heading with the bearing toward the matched path
//! point. Small changes are swallowed so the indicator does not jitter.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::geo::{self, GeoPoint};

/// Sensor-reported compass calibration grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompassAccuracy {
    Unreliable,
    Low,
    Medium,
    High,
}

impl CompassAccuracy {
    /// Map a 0-3 sensor grade; out-of-range values clamp.
    pub fn from_grade(grade: i32) -> Self {
        match grade {
            i32::MIN..=0 => CompassAccuracy::Unreliable,
            1 => CompassAccuracy::Low,
            2 => CompassAccuracy::Medium,
            _ => CompassAccuracy::High,
        }
    }
}

/// One compass reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Degrees clockwise from north.
    pub degrees: f64,
    pub accuracy: CompassAccuracy,
}

impl Heading {
    pub fn new(degrees: f64, accuracy: CompassAccuracy) -> Self {
        Self { degrees, accuracy }
    }
}

#[derive(Debug, Clone)]
pub struct BearingTracker {
    jitter_deg: f64,
    heading: Option<f64>,
    published: Option<f32>,
}

impl BearingTracker {
    pub fn new(jitter_deg: f64) -> Self {
        Self {
            jitter_deg,
            heading: None,
            published: None,
        }
    }

    /// Accept a compass reading. Anything below the top accuracy grade is
    /// dropped and the previous heading stays in effect.
    pub fn update_heading(&mut self, heading: &Heading) -> bool {
        if heading.accuracy < CompassAccuracy::High {
            trace!("ignoring compass reading with {:?} accuracy", heading.accuracy);
            return false;
        }
        self.heading = Some(geo::normalize_degrees(heading.degrees));
        true
    }

    /// Recompute the steering angle toward `target`.
    ///
    /// Returns the newly published angle, or `None` when there is no
    /// heading yet or the change is below the jitter threshold.
    pub fn steer(&mut self, position: &GeoPoint, target: &GeoPoint) -> Option<f32> {
        let heading = self.heading?;
        let target_bearing = geo::initial_bearing(position, target);
        let angle = geo::normalize_degrees(heading - target_bearing + 360.0);

        if let Some(last) = self.published {
            if geo::angular_difference(angle, f64::from(last)) < self.jitter_deg {
                return None;
            }
        }

        debug!("steering angle {angle:.1} (heading {heading:.1}, target {target_bearing:.1})");
        self.published = Some(angle as f32);
        self.published
    }

    /// Last published steering angle.
    pub fn steering_angle(&self) -> Option<f32> {
        self.published
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn reset(&mut self) {
        self.heading = None;
        self.published = None;
    }
}

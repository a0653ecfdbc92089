//! Navigation session.
//!
//! One `NavSession` per hike. The host calls it from a single task: GPS
//! fixes and compass headings drive synchronous recomputation, while
//! reroute/resume swap the active path between ticks. Outputs are read
//! back through [`NavSession::snapshot`].

use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::bearing::{BearingTracker, Heading};
use crate::companion::{self, Companion};
use crate::config::{NavConfig, RadarConfig};
use crate::error::NavError;
use crate::geo::GeoPoint;
use crate::matcher::{self, MatchResult};
use crate::path::Path;
use crate::radar::{RadarCluster, RadarProjector};
use crate::reroute::{self, FollowTarget, ReroutePlanner};
use crate::track_state::{SnoozeTicket, TrackPhase, TrackState};

/// One GPS sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position: GeoPoint,
    pub accuracy_m: f64,
    pub timestamp: Instant,
}

impl Fix {
    pub fn new(position: GeoPoint, accuracy_m: f64, timestamp: Instant) -> Self {
        Self { position, accuracy_m, timestamp }
    }

    /// Fix from a raw location reading. The altitude is carried on the
    /// position but never enters distance math.
    pub fn from_reading(lat: f64, lon: f64, altitude_m: Option<f64>, accuracy_m: f64, timestamp: Instant) -> Self {
        let position = match altitude_m {
            Some(ele) => GeoPoint::with_elevation(lat, lon, ele),
            None => GeoPoint::new(lat, lon),
        };
        Self::new(position, accuracy_m, timestamp)
    }

    /// True when the reported accuracy is worse than `threshold_m`. Such
    /// fixes are still matched; the host shows a low-signal indicator.
    pub fn is_low_signal(&self, threshold_m: f64) -> bool {
        self.accuracy_m > threshold_m
    }
}

/// Matcher-facing state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchState {
    /// Previously passed path point, used as the next warm-start hint.
    pub probable_index: Option<usize>,
    pub distance_from_path: Option<f64>,
    pub has_been_near: Option<bool>,
    pub is_off_path: bool,
}

/// Everything the presentation layer reads after a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavSnapshot {
    pub matched_index: Option<usize>,
    pub steering_angle: Option<f32>,
    pub is_off_path: bool,
    pub has_been_near: Option<bool>,
    pub progress: f32,
    pub remaining_distance_m: i64,
    pub distance_from_path_m: Option<f64>,
    pub notify_off: bool,
    pub notify_on_again: bool,
    pub low_signal: bool,
    pub phase: TrackPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<FollowTarget>,
    pub path_len: usize,
}

#[derive(Debug, Clone)]
pub struct NavSession {
    config: NavConfig,
    path: Path,
    matched: Option<MatchResult>,
    probable_index: Option<usize>,
    last_fix: Option<Fix>,
    track: TrackState,
    bearing: BearingTracker,
    planner: ReroutePlanner,
}

impl NavSession {
    pub fn new(path: Path, config: NavConfig) -> Self {
        info!("navigation session on {} points, {:.0} m", path.len(), path.total_length());
        Self {
            track: TrackState::new(&config, path.total_length()),
            bearing: BearingTracker::new(config.steering_jitter_deg),
            planner: ReroutePlanner::new(),
            matched: None,
            probable_index: None,
            last_fix: None,
            path,
            config,
        }
    }

    /// Start a session from raw coordinates.
    pub fn from_points(points: &[GeoPoint], config: NavConfig) -> Result<Self, NavError> {
        Ok(Self::new(Path::new(points)?, config))
    }

    /// Reset all per-session state, keeping the active path.
    pub fn restart(&mut self) {
        debug!("session restarted");
        self.matched = None;
        self.probable_index = None;
        self.last_fix = None;
        self.track.reset(self.path.total_length());
        self.bearing.reset();
    }

    /// Process one GPS fix. A missing fix skips the tick and keeps the
    /// previous outputs. Returns whether anything was recomputed.
    pub fn process_fix(&mut self, fix: Option<&Fix>) -> bool {
        let Some(fix) = fix else {
            debug!("no fix, skipping tick");
            return false;
        };

        let has_been_near = self.track.has_been_near() == Some(true);
        let matched = matcher::find_next_point(
            &fix.position,
            &self.path,
            self.probable_index,
            has_been_near,
            &self.config,
        );

        self.track.update(&self.path, &fix.position, &matched, fix.timestamp);
        self.bearing.steer(&fix.position, &matched.point.point);

        self.probable_index = Some(matched.index.saturating_sub(1));
        self.matched = Some(matched);
        self.last_fix = Some(*fix);
        true
    }

    /// Process one compass reading. Returns whether a new steering angle
    /// was published.
    pub fn process_heading(&mut self, heading: Option<Heading>) -> bool {
        let Some(heading) = heading else {
            return false;
        };
        if !self.bearing.update_heading(&heading) {
            return false;
        }
        match (&self.last_fix, &self.matched) {
            (Some(fix), Some(matched)) => {
                self.bearing.steer(&fix.position, &matched.point.point).is_some()
            }
            _ => false,
        }
    }

    /// Dismiss the off-track notification for `multiplier` snooze periods.
    pub fn snooze(&mut self, multiplier: u32, now: Instant) -> SnoozeTicket {
        self.track.snooze(multiplier, now)
    }

    /// Deliver a scheduled snooze expiry; stale tickets are ignored.
    pub fn wake_snooze(&mut self, ticket: &SnoozeTicket) -> bool {
        self.track.wake(ticket)
    }

    /// Expire timed signals without waiting for the next fix.
    pub fn poll_timers(&mut self, now: Instant) {
        self.track.expire(now);
    }

    /// Navigate toward `target` over a synthetic path. On error the
    /// session is left exactly as it was.
    pub fn reroute(&mut self, target: FollowTarget) -> Result<(), NavError> {
        let (base, anchor) = match self.planner.original() {
            Some(original) => {
                let fix = self.last_fix.as_ref().ok_or(NavError::NoPosition)?;
                let m = matcher::find_next_point(
                    &fix.position,
                    original,
                    self.planner.saved_hint(),
                    self.track.has_been_near() == Some(true),
                    &self.config,
                );
                (original, m.index.saturating_sub(1))
            }
            None => (&self.path, self.probable_index.ok_or(NavError::NoPosition)?),
        };

        let synthetic = reroute::plan(base, anchor, &target.target_point)?;
        info!("rerouted from index {anchor}: {} points, {:.0} m",
            synthetic.len(), synthetic.total_length());

        let original = std::mem::replace(&mut self.path, synthetic);
        self.planner.activate(original, self.probable_index, target);
        self.probable_index = None;
        self.rematch();
        Ok(())
    }

    /// Reroute toward the companion with `user_id`.
    pub fn follow(&mut self, user_id: &str, companions: &[Companion]) -> Result<(), NavError> {
        let companion = companions
            .iter()
            .find(|c| c.user_id == user_id)
            .ok_or_else(|| NavError::UnknownCompanion(user_id.to_string()))?;

        self.reroute(FollowTarget {
            target_user_id: companion.user_id.clone(),
            target_point: companion.position(),
        })
    }

    /// Reroute toward the most recent member that raised an SOS.
    pub fn follow_sos(&mut self, companions: &[Companion]) -> Result<(), NavError> {
        let caller = companion::requesting_help(companions)
            .into_iter()
            .next()
            .ok_or(NavError::NoHelpRequest)?;
        info!("following SOS from {}", caller.user_id);

        self.reroute(FollowTarget {
            target_user_id: caller.user_id.clone(),
            target_point: caller.position(),
        })
    }

    /// Restore the loaded path after a reroute and re-anchor on it.
    pub fn resume(&mut self) -> bool {
        let Some((original, hint)) = self.planner.resume() else {
            return false;
        };
        self.path = original;
        self.probable_index = hint;
        self.rematch();
        true
    }

    /// Re-run the matcher against the last fix on the active path.
    fn rematch(&mut self) {
        let Some(fix) = self.last_fix else {
            self.matched = None;
            return;
        };
        let matched = matcher::find_next_point(
            &fix.position,
            &self.path,
            self.probable_index,
            self.track.has_been_near() == Some(true),
            &self.config,
        );
        debug!("re-anchored at index {}", matched.index);
        self.track.refresh(&self.path, &fix.position, &matched);
        self.bearing.steer(&fix.position, &matched.point.point);
        self.probable_index = Some(matched.index.saturating_sub(1));
        self.matched = Some(matched);
    }

    /// Radar frame of `companions` around the hiker. Empty until the first fix.
    pub fn radar(&self, companions: &[Companion], config: &RadarConfig) -> Vec<RadarCluster> {
        let Some(fix) = &self.last_fix else {
            return Vec::new();
        };
        let heading = self.bearing.heading().unwrap_or(0.0);
        RadarProjector::new(config.clone()).frame(&fix.position, heading, companions)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn matched(&self) -> Option<&MatchResult> {
        self.matched.as_ref()
    }

    pub fn last_fix(&self) -> Option<&Fix> {
        self.last_fix.as_ref()
    }

    pub fn follow_target(&self) -> Option<&FollowTarget> {
        self.planner.target()
    }

    pub fn is_rerouted(&self) -> bool {
        self.planner.is_active()
    }

    pub fn match_state(&self) -> MatchState {
        MatchState {
            probable_index: self.probable_index,
            distance_from_path: self.track.distance_from_path(),
            has_been_near: self.track.has_been_near(),
            is_off_path: self.track.is_off_path(),
        }
    }

    pub fn snapshot(&self) -> NavSnapshot {
        let progress = self.track.progress();
        NavSnapshot {
            matched_index: self.matched.map(|m| m.index),
            steering_angle: self.bearing.steering_angle(),
            is_off_path: self.track.is_off_path(),
            has_been_near: self.track.has_been_near(),
            progress: progress.fraction,
            remaining_distance_m: progress.remaining_distance_m,
            distance_from_path_m: self.track.distance_from_path(),
            notify_off: self.track.notify_off(),
            notify_on_again: self.track.notify_on_again(),
            low_signal: self
                .last_fix
                .is_some_and(|f| f.is_low_signal(self.config.point_passed_threshold_m)),
            phase: self.track.phase(),
            following: self.planner.target().cloned(),
            path_len: self.path.len(),
        }
    }

    pub fn snapshot_json(&self) -> Result<String, NavError> {
        serde_json::to_string(&self.snapshot()).map_err(|e| NavError::Json(e.to_string()))
    }
}

//! Off-track detection with notification hysteresis.
//!
//! The hiker's relation to the path is one tagged phase instead of a set
//! of loose flags:
//!
//! ```text
//! Unestablished ──near──▶ OnTrack ◀──back──▶ OffTrack{Notified|Snoozed|Armed}
//!       │                    ▲
//!       └──far──▶ NeverNear ─┘ (joins once; never returns to NeverNear)
//! ```
//!
//! Snoozing is modeled with a monotonic token. Every request bumps the
//! token and only a wake-up carrying the current token may re-arm the
//! off-track alert, so a superseded snooze never clears it.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::NavConfig;
use crate::geo::{self, GeoPoint};
use crate::matcher::{self, MatchResult};
use crate::path::Path;

/// Alert state while the hiker is off the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffTrackAlert {
    /// The next off-track tick raises a notification.
    Armed,
    /// A notification is raised and not yet dismissed.
    Notified,
    /// Dismissed by the hiker; re-arms when the snooze expires.
    Snoozed,
}

/// The hiker's relation to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "alert")]
pub enum TrackPhase {
    /// No fix has been evaluated yet.
    Unestablished,
    /// Started away from the path and has not reached it yet.
    NeverNear,
    OnTrack,
    OffTrack(OffTrackAlert),
}

/// Progress along the active path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressState {
    /// Fraction of the path covered, in [0, 1].
    pub fraction: f32,
    pub remaining_distance_m: i64,
}

/// Handle for a scheduled snooze expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnoozeTicket {
    pub token: u64,
    #[serde(skip)]
    pub due: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct TrackState {
    near_threshold_m: f64,
    passed_threshold_m: f64,
    snooze_base: Duration,
    on_again_display: Duration,
    phase: TrackPhase,
    distance_from_path: Option<f64>,
    on_again_until: Option<Instant>,
    snooze_token: u64,
    snooze_until: Option<Instant>,
    progress: ProgressState,
}

impl TrackState {
    pub fn new(config: &NavConfig, total_length: f64) -> Self {
        Self {
            near_threshold_m: config.near_threshold_m,
            passed_threshold_m: config.point_passed_threshold_m,
            snooze_base: Duration::from_millis(config.snooze_base_ms),
            on_again_display: Duration::from_millis(config.on_again_display_ms),
            phase: TrackPhase::Unestablished,
            distance_from_path: None,
            on_again_until: None,
            snooze_token: 0,
            snooze_until: None,
            progress: ProgressState {
                fraction: 0.0,
                remaining_distance_m: total_length.round() as i64,
            },
        }
    }

    /// Return to the initial state, keeping the snooze token monotonic.
    pub fn reset(&mut self, total_length: f64) {
        self.phase = TrackPhase::Unestablished;
        self.distance_from_path = None;
        self.on_again_until = None;
        self.snooze_until = None;
        self.snooze_token += 1;
        self.progress = ProgressState {
            fraction: 0.0,
            remaining_distance_m: total_length.round() as i64,
        };
    }

    /// Evaluate one fix against its matched path point.
    pub fn update(&mut self, path: &Path, position: &GeoPoint, matched: &MatchResult, now: Instant) {
        self.expire(now);

        let distance = matcher::distance_from_path(position, path, matched.index);
        self.distance_from_path = Some(distance);

        let near = distance < self.near_threshold_m;
        let off = distance > self.near_threshold_m;

        let previous = self.phase;
        self.phase = match previous {
            TrackPhase::Unestablished if near => {
                info!("first fix is near the path ({distance:.1} m)");
                TrackPhase::OnTrack
            }
            TrackPhase::Unestablished => {
                info!("first fix is far from the path ({distance:.1} m)");
                TrackPhase::NeverNear
            }
            TrackPhase::NeverNear if near => {
                info!("reached the path ({distance:.1} m)");
                self.raise_on_again(now);
                TrackPhase::OnTrack
            }
            TrackPhase::NeverNear => TrackPhase::NeverNear,
            TrackPhase::OnTrack if off => {
                warn!("off track: {distance:.1} m from path");
                TrackPhase::OffTrack(OffTrackAlert::Notified)
            }
            TrackPhase::OnTrack => TrackPhase::OnTrack,
            TrackPhase::OffTrack(OffTrackAlert::Armed) if off => {
                warn!("still off track after snooze: {distance:.1} m from path");
                TrackPhase::OffTrack(OffTrackAlert::Notified)
            }
            TrackPhase::OffTrack(alert) if off => TrackPhase::OffTrack(alert),
            TrackPhase::OffTrack(alert) => {
                info!("back on track ({distance:.1} m)");
                if alert != OffTrackAlert::Armed {
                    self.raise_on_again(now);
                }
                TrackPhase::OnTrack
            }
        };

        self.update_progress(path, position, matched);
    }

    /// Recompute path-relative outputs after the active path was swapped.
    ///
    /// The phase is left alone; only the deviation, progress and remaining
    /// distance are measured again against `path`.
    pub fn refresh(&mut self, path: &Path, position: &GeoPoint, matched: &MatchResult) {
        let distance = matcher::distance_from_path(position, path, matched.index);
        self.distance_from_path = Some(distance);

        if self.phase == TrackPhase::OnTrack {
            self.update_progress(path, position, matched);
        } else {
            let (_, remaining) = self.measure(path, position, matched);
            self.progress = ProgressState {
                fraction: 0.0,
                remaining_distance_m: remaining,
            };
        }
    }

    fn update_progress(&mut self, path: &Path, position: &GeoPoint, matched: &MatchResult) {
        if self.phase != TrackPhase::OnTrack {
            self.progress.fraction = 0.0;
            return;
        }

        let (fraction, remaining_distance_m) = self.measure(path, position, matched);
        self.progress = ProgressState {
            fraction,
            remaining_distance_m,
        };
    }

    /// Fraction covered and meters remaining for a position matched on `path`.
    fn measure(&self, path: &Path, position: &GeoPoint, matched: &MatchResult) -> (f32, i64) {
        let to_point = geo::distance(position, &matched.point.point);
        let total = path.total_length();
        let traveled = (matched.point.cumulative_distance - to_point).clamp(0.0, total);

        if matched.index == path.last_index() && to_point < self.passed_threshold_m {
            return (1.0, 0);
        }

        let fraction = if total > 0.0 { (traveled / total) as f32 } else { 0.0 };
        (fraction, (total - traveled).round() as i64)
    }

    fn raise_on_again(&mut self, now: Instant) {
        self.on_again_until = Some(now + self.on_again_display);
    }

    /// Dismiss the off-track notification for `multiplier` snooze periods.
    ///
    /// The caller schedules a wake-up at `ticket.due` and hands the ticket
    /// back through [`TrackState::wake`]; alternatively [`TrackState::expire`]
    /// can be polled with the current time.
    pub fn snooze(&mut self, multiplier: u32, now: Instant) -> SnoozeTicket {
        self.snooze_token += 1;
        let due = now + self.snooze_base * multiplier;
        self.snooze_until = Some(due);

        if self.phase == TrackPhase::OffTrack(OffTrackAlert::Notified) {
            self.phase = TrackPhase::OffTrack(OffTrackAlert::Snoozed);
        }
        debug!("snooze #{} scheduled for {:?}", self.snooze_token, self.snooze_base * multiplier);

        SnoozeTicket {
            token: self.snooze_token,
            due: Some(due),
        }
    }

    /// Handle a snooze expiry. Returns false for a superseded ticket.
    pub fn wake(&mut self, ticket: &SnoozeTicket) -> bool {
        if ticket.token != self.snooze_token {
            debug!("ignoring stale snooze #{} (latest #{})", ticket.token, self.snooze_token);
            return false;
        }
        self.snooze_until = None;
        if self.phase == TrackPhase::OffTrack(OffTrackAlert::Snoozed) {
            debug!("snooze #{} expired, off-track alert re-armed", ticket.token);
            self.phase = TrackPhase::OffTrack(OffTrackAlert::Armed);
        }
        true
    }

    /// Clear timed state that has run out by `now`.
    pub fn expire(&mut self, now: Instant) {
        if self.on_again_until.is_some_and(|until| now >= until) {
            self.on_again_until = None;
        }
        if self.snooze_until.is_some_and(|until| now >= until) {
            let ticket = SnoozeTicket {
                token: self.snooze_token,
                due: self.snooze_until,
            };
            self.wake(&ticket);
        }
    }

    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    pub fn has_been_near(&self) -> Option<bool> {
        match self.phase {
            TrackPhase::Unestablished => None,
            TrackPhase::NeverNear => Some(false),
            TrackPhase::OnTrack | TrackPhase::OffTrack(_) => Some(true),
        }
    }

    pub fn is_off_path(&self) -> bool {
        matches!(self.phase, TrackPhase::OffTrack(_))
    }

    pub fn notify_off(&self) -> bool {
        self.phase == TrackPhase::OffTrack(OffTrackAlert::Notified)
    }

    pub fn already_notified_off(&self) -> bool {
        matches!(
            self.phase,
            TrackPhase::OffTrack(OffTrackAlert::Notified | OffTrackAlert::Snoozed)
        )
    }

    pub fn notify_on_again(&self) -> bool {
        self.on_again_until.is_some()
    }

    pub fn snooze_until(&self) -> Option<Instant> {
        self.snooze_until
    }

    pub fn distance_from_path(&self) -> Option<f64> {
        self.distance_from_path
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon)
    }

    fn path3() -> Path {
        Path::new(&[pt(0.0, 0.0), pt(0.0, 0.001), pt(0.0, 0.002)]).unwrap()
    }

    fn on_fix() -> GeoPoint {
        pt(0.0, 0.0005)
    }

    fn off_fix() -> GeoPoint {
        pt(0.001, 0.001)
    }

    fn step(state: &mut TrackState, path: &Path, position: GeoPoint, index: usize, now: Instant) {
        let matched = MatchResult { index, point: path[index] };
        state.update(path, &position, &matched, now);
    }

    fn fresh(path: &Path) -> TrackState {
        TrackState::new(&NavConfig::default(), path.total_length())
    }

    #[test]
    fn first_near_fix_joins_without_signal() {
        let path = path3();
        let mut state = fresh(&path);
        assert_eq!(state.has_been_near(), None);

        step(&mut state, &path, on_fix(), 1, Instant::now());
        assert_eq!(state.has_been_near(), Some(true));
        assert!(!state.is_off_path());
        assert!(!state.notify_on_again());
    }

    #[test]
    fn starting_far_is_not_off_path() {
        let path = path3();
        let mut state = fresh(&path);
        step(&mut state, &path, off_fix(), 1, Instant::now());

        assert_eq!(state.has_been_near(), Some(false));
        assert!(!state.is_off_path());
        assert!(!state.notify_off());
        assert_eq!(state.progress().fraction, 0.0);
    }

    #[test]
    fn joining_from_far_raises_on_again_once() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, off_fix(), 1, t0);
        step(&mut state, &path, on_fix(), 1, t0 + Duration::from_secs(1));

        assert_eq!(state.has_been_near(), Some(true));
        assert!(state.notify_on_again());

        // auto-clears after the display delay and does not fire again
        step(&mut state, &path, on_fix(), 1, t0 + Duration::from_secs(10));
        assert!(!state.notify_on_again());
    }

    #[test]
    fn has_been_near_latches() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, on_fix(), 1, t0);
        for i in 1..20 {
            let far = pt(0.01 * i as f64, 0.01 * i as f64);
            step(&mut state, &path, far, 1, t0 + Duration::from_secs(i));
            assert_eq!(state.has_been_near(), Some(true));
        }
    }

    #[test]
    fn off_track_notifies_once_per_excursion() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, on_fix(), 1, t0);

        step(&mut state, &path, off_fix(), 1, t0 + Duration::from_secs(1));
        assert!(state.is_off_path());
        assert!(state.notify_off());
        assert!(state.distance_from_path().unwrap() > 25.0);
        assert_eq!(state.progress().fraction, 0.0);

        // staying off does not produce a new transition
        step(&mut state, &path, off_fix(), 1, t0 + Duration::from_secs(2));
        assert_eq!(state.phase(), TrackPhase::OffTrack(OffTrackAlert::Notified));

        // back on track clears the alert and re-arms it
        step(&mut state, &path, on_fix(), 1, t0 + Duration::from_secs(3));
        assert!(!state.notify_off());
        assert!(!state.already_notified_off());
        assert!(state.notify_on_again());

        step(&mut state, &path, off_fix(), 1, t0 + Duration::from_secs(4));
        assert!(state.notify_off());
    }

    #[test]
    fn snooze_rearms_after_expiry() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, on_fix(), 1, t0);
        step(&mut state, &path, off_fix(), 1, t0);

        let ticket = state.snooze(1, t0);
        assert!(!state.notify_off());
        assert!(state.already_notified_off());
        assert_eq!(ticket.due, Some(t0 + Duration::from_secs(60)));

        step(&mut state, &path, off_fix(), 1, t0 + Duration::from_secs(30));
        assert!(!state.notify_off());

        assert!(state.wake(&ticket));
        assert!(!state.already_notified_off());
        step(&mut state, &path, off_fix(), 1, t0 + Duration::from_secs(61));
        assert!(state.notify_off());
    }

    #[test]
    fn superseded_snooze_is_ignored() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, on_fix(), 1, t0);
        step(&mut state, &path, off_fix(), 1, t0);

        let first = state.snooze(1, t0);
        let second = state.snooze(2, t0 + Duration::from_secs(10));

        assert!(!state.wake(&first));
        assert!(state.already_notified_off());

        // polling at the first snooze's deadline must not re-arm either
        state.expire(t0 + Duration::from_secs(61));
        assert!(state.already_notified_off());

        state.expire(t0 + Duration::from_secs(130));
        assert!(!state.already_notified_off());
        assert!(!state.wake(&first));
        assert_eq!(second.token, first.token + 1);
    }

    #[test]
    fn returning_during_snooze_signals_on_again() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        step(&mut state, &path, on_fix(), 1, t0);
        step(&mut state, &path, off_fix(), 1, t0);
        state.snooze(1, t0);

        step(&mut state, &path, on_fix(), 1, t0 + Duration::from_secs(5));
        assert!(state.notify_on_again());
        assert_eq!(state.phase(), TrackPhase::OnTrack);
    }

    #[test]
    fn progress_on_first_segment() {
        let path = path3();
        let mut state = fresh(&path);
        step(&mut state, &path, on_fix(), 1, Instant::now());

        let progress = state.progress();
        assert!((progress.fraction - 0.25).abs() < 0.01, "got {}", progress.fraction);
        assert!((progress.remaining_distance_m - 167).abs() <= 1);
    }

    #[test]
    fn progress_completes_at_last_point() {
        let path = path3();
        let mut state = fresh(&path);
        step(&mut state, &path, pt(0.0, 0.00199), 2, Instant::now());

        let progress = state.progress();
        assert_eq!(progress.fraction, 1.0);
        assert_eq!(progress.remaining_distance_m, 0);
    }

    #[test]
    fn progress_stays_in_bounds() {
        let path = path3();
        let mut state = fresh(&path);
        let t0 = Instant::now();
        for i in 0..=20 {
            let position = pt(0.00001, -0.0002 + i as f64 * 0.00012);
            let matched = matcher::find_next_point(
                &position,
                &path,
                None,
                state.has_been_near() == Some(true),
                &NavConfig::default(),
            );
            state.update(&path, &position, &matched, t0 + Duration::from_secs(i));
            let f = state.progress().fraction;
            assert!((0.0..=1.0).contains(&f), "progress {f} out of bounds");
        }
    }

    #[test]
    fn refresh_measures_against_new_path() {
        let path = path3();
        let mut state = fresh(&path);
        step(&mut state, &path, pt(0.0, 0.0015), 2, Instant::now());
        assert_eq!(state.progress().remaining_distance_m, 56);

        // Shorter path whose second point is 55 m ahead of the hiker.
        let shorter = Path::new(&[pt(0.0, 0.001), pt(0.0, 0.002)]).unwrap();
        let matched = MatchResult { index: 1, point: shorter[1] };
        state.refresh(&shorter, &pt(0.0, 0.0015), &matched);

        assert_eq!(state.phase(), TrackPhase::OnTrack);
        let progress = state.progress();
        assert!((progress.fraction - 0.5).abs() < 0.01, "got {}", progress.fraction);
        assert!((progress.remaining_distance_m - 56).abs() <= 1);
        assert!(state.distance_from_path().unwrap() < 0.01);
    }

    #[test]
    fn remaining_never_exceeds_path_length() {
        let path = path3();
        let mut state = fresh(&path);
        // 10 m before the first point, close enough to join
        step(&mut state, &path, pt(0.0, -0.00009), 1, Instant::now());
        assert_eq!(state.phase(), TrackPhase::OnTrack);

        let progress = state.progress();
        assert_eq!(progress.fraction, 0.0);
        assert_eq!(progress.remaining_distance_m, path.total_length().round() as i64);
    }

    #[test]
    fn reset_returns_to_unestablished() {
        let path = path3();
        let mut state = fresh(&path);
        step(&mut state, &path, on_fix(), 1, Instant::now());
        state.reset(path.total_length());
        assert_eq!(state.phase(), TrackPhase::Unestablished);
        assert_eq!(state.distance_from_path(), None);
    }
}

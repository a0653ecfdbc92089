//! SOS rerouting toward a companion.
//!
//! A reroute replaces the active path with a synthetic one: the stretch
//! of the loaded path between the hiker and the point nearest to the
//! companion, followed by a final leg to the companion's position. The
//! loaded path is kept aside so navigation can resume on it later.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::NavError;
use crate::geo::GeoPoint;
use crate::path::Path;

/// Companion the hiker is currently being routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowTarget {
    pub target_user_id: String,
    pub target_point: GeoPoint,
}

/// Build the synthetic path from `anchor` (the hiker's last passed point)
/// toward `target`.
pub fn plan(path: &Path, anchor: usize, target: &GeoPoint) -> Result<Path, NavError> {
    let nearest = path.nearest_index(target);
    let invalid = NavError::InvalidRange { anchor, target: nearest };

    if anchor >= path.len() || nearest == anchor {
        return Err(invalid);
    }

    let points = path.points();
    let mut leg: Vec<GeoPoint> = if nearest > anchor {
        points[anchor.saturating_sub(1)..=nearest].iter().map(|p| p.point).collect()
    } else {
        points[nearest..=anchor].iter().rev().map(|p| p.point).collect()
    };

    if leg.len() < 2 {
        return Err(invalid);
    }

    leg.push(*target);
    Path::new(&leg)
}

#[derive(Debug, Clone)]
struct SavedPath {
    path: Path,
    hint: Option<usize>,
}

/// Keeps the loaded path while a synthetic one is active.
#[derive(Debug, Clone, Default)]
pub struct ReroutePlanner {
    saved: Option<SavedPath>,
    target: Option<FollowTarget>,
}

impl ReroutePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    pub fn target(&self) -> Option<&FollowTarget> {
        self.target.as_ref()
    }

    /// The loaded path, if a reroute is active.
    pub fn original(&self) -> Option<&Path> {
        self.saved.as_ref().map(|s| &s.path)
    }

    /// Matcher hint on the loaded path at the time of the first reroute.
    pub fn saved_hint(&self) -> Option<usize> {
        self.saved.as_ref().and_then(|s| s.hint)
    }

    /// Record an accepted reroute. A second reroute keeps the path that
    /// was loaded before the first one.
    pub fn activate(&mut self, original: Path, hint: Option<usize>, target: FollowTarget) {
        info!("rerouting toward {} at ({:.6}, {:.6})",
            target.target_user_id, target.target_point.lat, target.target_point.lon);
        if self.saved.is_none() {
            self.saved = Some(SavedPath { path: original, hint });
        }
        self.target = Some(target);
    }

    /// Drop the synthetic path and hand back the loaded one with its hint.
    pub fn resume(&mut self) -> Option<(Path, Option<usize>)> {
        self.target = None;
        let saved = self.saved.take()?;
        info!("resuming original path ({} points)", saved.path.len());
        Some((saved.path, saved.hint))
    }
}

//! Map matching.
//!
//! Finds the path point the hiker is currently heading toward. Paths
//! often pass near themselves (loops, switchbacks, out-and-back trails),
//! so a warm update walks forward from the previous match instead of
//! taking the global nearest point.

use log::trace;
use serde::Serialize;

use crate::config::NavConfig;
use crate::geo::{self, GeoPoint};
use crate::path::{Path, PathPoint};

/// Outcome of one matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    /// Index of the path point the hiker is heading toward.
    pub index: usize,
    pub point: PathPoint,
}

/// Deviation of `position` from the segment ending at `index`.
///
/// Triangle-inequality excess `d(p, prev) + d(p, next) - d(prev, next)`:
/// zero when the position lies on the segment and growing with lateral
/// offset. Index 0 is measured against the first segment.
pub fn distance_from_path(position: &GeoPoint, path: &Path, index: usize) -> f64 {
    if path.len() < 2 {
        return geo::distance(position, &path.first().point);
    }

    let next = index.clamp(1, path.last_index());
    let prev = &path[next - 1];
    let next = &path[next];

    let excess = geo::distance(position, &prev.point) + geo::distance(position, &next.point)
        - next.distance_to_previous;
    excess.max(0.0)
}

/// Find the next relevant path point for a position.
///
/// `probable_index` is the previously passed point (the hint from the
/// last tick); `None` triggers a cold-start search over the whole path.
pub fn find_next_point(
    position: &GeoPoint,
    path: &Path,
    probable_index: Option<usize>,
    has_been_near: bool,
    config: &NavConfig,
) -> MatchResult {
    if path.len() == 1 {
        return MatchResult { index: 0, point: path[0] };
    }

    let candidate = match probable_index {
        Some(hint) if hint < path.len() => {
            warm_candidate(position, path, hint, has_been_near, config)
                .unwrap_or_else(|| cold_candidate(position, path, config))
        }
        _ => cold_candidate(position, path, config),
    };

    let index = refine(position, path, candidate, config);
    trace!("matched candidate {candidate} -> index {index}");

    MatchResult { index, point: path[index] }
}

/// Nearest point by straight-line distance, biased toward the start of
/// the path when the nearest point sits in its trailing window.
fn cold_candidate(position: &GeoPoint, path: &Path, config: &NavConfig) -> usize {
    let k = config.cold_start_candidates.max(1);
    let mut nearest: Vec<(usize, f64)> = Vec::with_capacity(k + 1);

    for p in path.points() {
        let d = geo::distance(position, &p.point);
        if nearest.len() == k && d >= nearest[k - 1].1 {
            continue;
        }
        let slot = nearest.iter().position(|&(_, nd)| d < nd).unwrap_or(nearest.len());
        nearest.insert(slot, (p.index, d));
        nearest.truncate(k);
    }

    let best = nearest[0].0;
    let window = config.cold_start_end_window.min(path.len());
    if best >= path.len() - window {
        if let Some(&(early, _)) = nearest
            .iter()
            .find(|&&(i, _)| i < config.cold_start_index_cutoff)
        {
            return early;
        }
    }
    best
}

/// Walk the path as a loop starting at `hint` and stop at the first local
/// minimum of deviation once a near candidate has been seen.
fn warm_candidate(
    position: &GeoPoint,
    path: &Path,
    hint: usize,
    has_been_near: bool,
    config: &NavConfig,
) -> Option<usize> {
    let len = path.len();
    let loop_skip_from = (len as f64 * config.loop_skip_fraction) as usize;
    let start = path.first().point;

    let mut best: Option<(usize, f64)> = None;
    let mut found_near = false;

    for offset in 0..len {
        let index = (hint + offset) % len;
        if index == 0 || index == hint {
            continue;
        }
        if !has_been_near
            && index > loop_skip_from
            && geo::distance(&path[index].point, &start) < config.loop_start_radius_m
        {
            continue;
        }

        let d = distance_from_path(position, path, index);
        match best {
            Some((_, best_d)) if d >= best_d => {
                if found_near && d > best_d {
                    break;
                }
            }
            _ => best = Some((index, d)),
        }
        if d < config.near_threshold_m {
            found_near = true;
        }
    }

    best.map(|(index, _)| index)
}

/// Apply the end-of-path rules, skip points already passed and pick
/// between the two segments adjacent to the candidate.
fn refine(position: &GeoPoint, path: &Path, candidate: usize, config: &NavConfig) -> usize {
    let last = path.last_index();
    if candidate == 0 {
        return 1;
    }
    if candidate >= last {
        return last;
    }

    let mut w = candidate;
    while w < last && geo::distance(position, &path[w].point) <= config.point_passed_threshold_m {
        w += 1;
    }
    if w == last {
        return last;
    }

    let a = geo::distance(position, &path[w].point);
    let b = geo::distance(position, &path[w - 1].point);
    let c = geo::distance(position, &path[w + 1].point);
    let x = path[w].distance_to_previous;
    let y = path[w + 1].distance_to_previous;

    let offset_current = (a + b) - x;
    let offset_next = (a + c) - y;

    if offset_current > offset_next && offset_next < config.near_threshold_m {
        w + 1
    } else {
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon)
    }

    fn straight(n: usize) -> Path {
        let points: Vec<GeoPoint> = (0..n).map(|i| pt(0.0, i as f64 * 0.001)).collect();
        Path::new(&points).unwrap()
    }

    fn config() -> NavConfig {
        NavConfig::default()
    }

    #[test]
    fn deviation_zero_on_segment() {
        let path = straight(3);
        let d = distance_from_path(&pt(0.0, 0.0005), &path, 1);
        assert!(d < 0.01, "Expected ~0, got {d}");
    }

    #[test]
    fn deviation_grows_with_lateral_offset() {
        let path = straight(3);
        let near = distance_from_path(&pt(0.0001, 0.0005), &path, 1);
        let far = distance_from_path(&pt(0.001, 0.0005), &path, 1);
        assert!(near > 0.0 && far > near);
        assert!(far > 25.0, "Expected off-track magnitude, got {far}");
    }

    #[test]
    fn deviation_on_single_point_path_is_distance() {
        let path = Path::new(&[pt(0.0, 0.0)]).unwrap();
        let d = distance_from_path(&pt(0.0, 0.001), &path, 0);
        assert!((d - 111.19).abs() < 0.1);
    }

    #[test]
    fn cold_start_between_first_points() {
        let path = straight(3);
        let m = find_next_point(&pt(0.0, 0.0005), &path, None, false, &config());
        assert_eq!(m.index, 1);
        assert_eq!(m.point.index, 1);
    }

    #[test]
    fn cold_start_at_first_point_heads_to_second() {
        let path = straight(5);
        let m = find_next_point(&pt(0.0, 0.0), &path, None, false, &config());
        assert_eq!(m.index, 1);
    }

    #[test]
    fn cold_start_on_closed_loop_prefers_start() {
        // Square loop whose last point ends ~5 m from the first.
        let path = Path::new(&[
            pt(0.0, 0.0),
            pt(0.0, 0.001),
            pt(0.0, 0.002),
            pt(0.001, 0.002),
            pt(0.002, 0.002),
            pt(0.002, 0.001),
            pt(0.002, 0.0),
            pt(0.001, 0.0),
            pt(0.00005, 0.0),
        ])
        .unwrap();

        // Closer to the final point than to the first one.
        let m = find_next_point(&pt(0.0001, 0.0), &path, None, false, &config());
        assert_eq!(m.index, 1);
    }

    #[test]
    fn passed_point_is_skipped() {
        let path = straight(5);
        // 1 m beyond point 1
        let m = find_next_point(&pt(0.0, 0.00101), &path, None, false, &config());
        assert_eq!(m.index, 2);
    }

    #[test]
    fn next_segment_wins_when_it_explains_the_fix() {
        let path = straight(4);
        // A quarter of the way along segment 1-2; nearest point is 1.
        let m = find_next_point(&pt(0.0, 0.00125), &path, None, false, &config());
        assert_eq!(m.index, 2);
    }

    #[test]
    fn end_of_path_returns_last_index() {
        let path = straight(4);
        let m = find_next_point(&pt(0.0, 0.00302), &path, Some(2), true, &config());
        assert_eq!(m.index, 3);
    }

    #[test]
    fn warm_update_follows_the_hiker() {
        let path = straight(10);
        let mut hint = None;
        let mut matched = 0;
        for step in 0..6 {
            let position = pt(0.0, 0.0005 + step as f64 * 0.001);
            let m = find_next_point(&position, &path, hint, true, &config());
            assert!(m.index >= matched, "match went backwards at step {step}");
            matched = m.index;
            hint = Some(m.index.saturating_sub(1));
        }
        assert_eq!(matched, 6);
    }

    #[test]
    fn warm_update_ignores_nearby_return_leg() {
        // Out-and-back trail: the return leg runs 20 m north of the way out.
        let mut points: Vec<GeoPoint> = (0..6).map(|i| pt(0.0, i as f64 * 0.001)).collect();
        points.extend((0..6).rev().map(|i| pt(0.00018, i as f64 * 0.001)));
        let path = Path::new(&points).unwrap();

        // Hiker is on the way out between points 2 and 3, slightly north.
        let m = find_next_point(&pt(0.00005, 0.0025), &path, Some(2), true, &config());
        assert_eq!(m.index, 3);
    }

    #[test]
    fn loop_end_near_start_skipped_before_joining() {
        let path = Path::new(&[
            pt(0.0, 0.0),
            pt(0.0, 0.001),
            pt(0.0, 0.002),
            pt(0.001, 0.002),
            pt(0.002, 0.002),
            pt(0.002, 0.001),
            pt(0.002, 0.0),
            pt(0.001, 0.0),
            pt(0.0001, 0.0),
            pt(0.00002, 0.0),
        ])
        .unwrap();
        let position = pt(0.00003, 0.0);

        let before = find_next_point(&position, &path, Some(5), false, &config());
        assert!(before.index < 8, "should not snap to the loop end, got {}", before.index);

        let after = find_next_point(&position, &path, Some(5), true, &config());
        assert!(after.index >= 8, "joined hiker may match the loop end, got {}", after.index);
    }

    #[test]
    fn single_point_path_matches_itself() {
        let path = Path::new(&[pt(1.0, 1.0)]).unwrap();
        let m = find_next_point(&pt(1.001, 1.0), &path, Some(0), true, &config());
        assert_eq!(m.index, 0);
    }
}

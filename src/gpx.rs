//! GPX input.
//!
//! Wraps the `gpx` crate and flattens a downloaded track into the ordered
//! point list the engine navigates along. Multi-segment tracks are joined
//! in file order. Files that only contain a route are accepted as well.

use std::io::Read;

use log::debug;

use crate::error::NavError;
use crate::geo::GeoPoint;
use crate::path::Path;

fn to_geo(wp: &gpx::Waypoint) -> GeoPoint {
    GeoPoint {
        lat: wp.point().y(),
        lon: wp.point().x(),
        ele: wp.elevation,
    }
}

/// Read the points of the first track, or of the first route if the file
/// has no track.
pub fn read_points<R: Read>(reader: R) -> Result<Vec<GeoPoint>, NavError> {
    let gpx = gpx::read(reader).map_err(|e| NavError::Gpx(e.to_string()))?;

    if let Some(track) = gpx.tracks.iter().find(|t| t.segments.iter().any(|s| !s.points.is_empty())) {
        let points: Vec<GeoPoint> = track
            .segments
            .iter()
            .flat_map(|seg| seg.points.iter())
            .map(to_geo)
            .collect();
        debug!("loaded track {:?} with {} points", track.name, points.len());
        return Ok(points);
    }

    if let Some(route) = gpx.routes.iter().find(|r| !r.points.is_empty()) {
        debug!("loaded route {:?} with {} points", route.name, route.points.len());
        return Ok(route.points.iter().map(to_geo).collect());
    }

    Ok(Vec::new())
}

impl Path {
    /// Build a path straight from GPX bytes.
    pub fn from_gpx(data: &[u8]) -> Result<Path, NavError> {
        let points = read_points(data)?;
        Path::new(&points)
    }
}

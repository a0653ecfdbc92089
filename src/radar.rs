//! Heading-relative radar of nearby group members.
//!
//! Each member is placed on a disc centered on the hiker, rotated so the
//! hiker's heading points up. Distances are compressed through three
//! linear bands so close members stay readable while far ones still fit:
//!
//! | distance            | radius fraction |
//! |---------------------|-----------------|
//! | 0 - 50 m            | 0.00 - 0.33     |
//! | 50 - 250 m          | 0.33 - 0.66     |
//! | 250 m - max range   | 0.66 - 0.99     |
//!
//! Members beyond the max range are pinned to the rim and flagged capped.

use serde::Serialize;

use crate::companion::Companion;
use crate::config::RadarConfig;
use crate::geo::{self, GeoPoint};

const NEAR_BAND_M: f64 = 50.0;
const MID_BAND_M: f64 = 250.0;
const BAND_SPAN: f64 = 0.33;
const RIM_FRACTION: f64 = 0.99;

/// Screen offset from the radar center in pixels; y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScreenOffset {
    pub x: f64,
    pub y: f64,
}

impl ScreenOffset {
    fn from_polar(radius_px: f64, bearing_deg: f64) -> Self {
        let theta = bearing_deg.to_radians();
        Self {
            x: radius_px * theta.sin(),
            y: -radius_px * theta.cos(),
        }
    }

    fn distance_to(&self, other: &ScreenOffset) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Radius and heading-relative bearing of a member on the display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolarOffset {
    pub radius_px: f64,
    pub bearing_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberProjection {
    pub member_id: String,
    pub polar_offset: PolarOffset,
    pub offset: ScreenOffset,
    pub distance_m: f64,
    pub is_capped: bool,
    pub help_requested: bool,
}

/// Member position inside a cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    pub projection: MemberProjection,
    /// Where the marker is drawn; fanned out around the centroid when the
    /// cluster has more than one member.
    pub display: ScreenOffset,
}

/// Markers close enough on screen to be drawn as one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarCluster {
    pub center: ScreenOffset,
    pub members: Vec<ClusterMember>,
}

impl RadarCluster {
    fn recenter(&mut self) {
        let n = self.members.len() as f64;
        let (sx, sy) = self.members.iter().fold((0.0, 0.0), |(sx, sy), m| {
            (sx + m.projection.offset.x, sy + m.projection.offset.y)
        });
        self.center = ScreenOffset { x: sx / n, y: sy / n };
    }

    fn spread(&mut self, radius_px: f64) {
        let n = self.members.len();
        if n == 1 {
            self.members[0].display = self.center;
            return;
        }
        for (k, member) in self.members.iter_mut().enumerate() {
            let around = ScreenOffset::from_polar(radius_px, 360.0 * k as f64 / n as f64);
            member.display = ScreenOffset {
                x: self.center.x + around.x,
                y: self.center.y + around.y,
            };
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadarProjector {
    config: RadarConfig,
}

impl RadarProjector {
    pub fn new(config: RadarConfig) -> Self {
        Self { config }
    }

    /// Map a distance onto the display radius. Returns the radius in pixels
    /// and whether the distance was capped at the rim.
    pub fn scale_distance(&self, distance_m: f64) -> (f64, bool) {
        let (fraction, capped) = if distance_m > self.config.max_range_m {
            (RIM_FRACTION, true)
        } else if distance_m <= NEAR_BAND_M {
            (distance_m / NEAR_BAND_M * BAND_SPAN, false)
        } else if distance_m <= MID_BAND_M {
            let t = (distance_m - NEAR_BAND_M) / (MID_BAND_M - NEAR_BAND_M);
            (BAND_SPAN + t * BAND_SPAN, false)
        } else {
            let t = (distance_m - MID_BAND_M) / (self.config.max_range_m - MID_BAND_M);
            (2.0 * BAND_SPAN + t * BAND_SPAN, false)
        };

        (fraction.clamp(0.0, RIM_FRACTION) * self.config.display_radius_px, capped)
    }

    /// Project members relative to the hiker's position and heading.
    pub fn project(&self, own: &GeoPoint, heading_deg: f64, companions: &[Companion]) -> Vec<MemberProjection> {
        companions
            .iter()
            .map(|c| {
                let other = c.position();
                let distance_m = geo::distance(own, &other);
                let bearing = geo::initial_bearing(own, &other);
                let relative = geo::normalize_degrees(bearing - heading_deg + 360.0);
                let (radius_px, is_capped) = self.scale_distance(distance_m);

                MemberProjection {
                    member_id: c.user_id.clone(),
                    polar_offset: PolarOffset {
                        radius_px,
                        bearing_deg: relative,
                    },
                    offset: ScreenOffset::from_polar(radius_px, relative),
                    distance_m,
                    is_capped,
                    help_requested: c.help_requested,
                }
            })
            .collect()
    }

    /// Merge projections closer than the merge distance. Clusters are
    /// rebuilt from scratch on every call.
    pub fn cluster(&self, projections: Vec<MemberProjection>) -> Vec<RadarCluster> {
        let mut clusters: Vec<RadarCluster> = Vec::new();

        for projection in projections {
            let member = ClusterMember {
                display: projection.offset,
                projection,
            };
            let offset = member.projection.offset;

            match clusters
                .iter_mut()
                .find(|c| c.center.distance_to(&offset) <= self.config.merge_distance_px)
            {
                Some(cluster) => {
                    cluster.members.push(member);
                    cluster.recenter();
                }
                None => clusters.push(RadarCluster {
                    center: offset,
                    members: vec![member],
                }),
            }
        }

        for cluster in &mut clusters {
            cluster.spread(self.config.spread_radius_px);
        }
        clusters
    }

    /// Project and cluster in one step.
    pub fn frame(&self, own: &GeoPoint, heading_deg: f64, companions: &[Companion]) -> Vec<RadarCluster> {
        self.cluster(self.project(own, heading_deg, companions))
    }
}

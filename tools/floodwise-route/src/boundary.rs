//! Flood-zone polygons from the flooded/dry partition
//!
//! Border nodes are flooded nodes with a dry node at one of the 8 fixed
//! offsets around them (a spatial proximity test, independent of road
//! edges). Their convex hull approximates the flooded area.
//!
//! Coordinates are compared as fixed-point integers so the offset lookups
//! are exact, and hulls are computed in that integer space so orientation
//! tests are exact too.

use floodwise_common::LatLng;
use geo::{ConvexHull, Coord, MultiPoint};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::components::DisjointSet;
use crate::flood::FloodView;
use crate::geo::{from_fixed, to_fixed, FXP_SCALE};

/// Unit offsets of the 8 neighbours: N, S, E, W and the diagonals
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
];

/// Minimum number of points that can enclose an area
const MIN_POLYGON_POINTS: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum BoundaryError {
    #[error("Flood boundary extraction cancelled")]
    Cancelled,
}

/// How border nodes are turned into polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HullMode {
    /// One hull around every border node, even across disjoint pockets
    Single,
    /// One hull per spatial cluster of border nodes
    #[default]
    Clustered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryOptions {
    /// Latitude/longitude offset of the 8 neighbour lookups, in degrees
    pub neighbor_offset_deg: f64,
    /// Fixed-point units per degree used to compare coordinates
    pub coordinate_scale: f64,
    pub hull_mode: HullMode,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            neighbor_offset_deg: 0.0002,
            coordinate_scale: FXP_SCALE,
            hull_mode: HullMode::default(),
        }
    }
}

/// Convex polygon around a cluster of flooded border nodes.
///
/// Vertices are in hull order (counter-clockwise); the ring is not closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FloodPolygon {
    pub vertices: Vec<LatLng>,
}

#[derive(Debug, Clone, Default)]
pub struct BoundaryExtractor {
    options: BoundaryOptions,
}

impl BoundaryExtractor {
    pub fn new(options: BoundaryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BoundaryOptions {
        &self.options
    }

    fn offset_units(&self) -> i64 {
        to_fixed(self.options.neighbor_offset_deg, self.options.coordinate_scale).max(1)
    }

    fn key(&self, view: &FloodView<'_>, idx: u32) -> (i64, i64) {
        let node = view.graph().node(idx);
        let scale = self.options.coordinate_scale;
        (to_fixed(node.lat, scale), to_fixed(node.lng, scale))
    }

    /// Flooded nodes with a dry node at one of the 8 neighbour offsets.
    ///
    /// Returns node indices in ascending order.
    pub fn border_nodes(&self, view: &FloodView<'_>) -> Vec<u32> {
        let offset = self.offset_units();
        let dry: FxHashSet<(i64, i64)> = view.dry_indices().map(|idx| self.key(view, idx)).collect();

        view.flooded_indices()
            .filter(|&idx| {
                let (lat, lng) = self.key(view, idx);
                NEIGHBOR_OFFSETS
                    .iter()
                    .any(|&(dlat, dlng)| dry.contains(&(lat + dlat * offset, lng + dlng * offset)))
            })
            .collect()
    }

    /// Flood polygons for `view`.
    ///
    /// Fewer than 3 flooded nodes or fewer than 3 border nodes yield an empty
    /// list. Clusters whose hull has no area are dropped.
    pub fn extract(
        &self,
        view: &FloodView<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<FloodPolygon>, BoundaryError> {
        if view.flooded_count() < MIN_POLYGON_POINTS {
            return Ok(Vec::new());
        }

        let border = self.border_nodes(view);
        if border.len() < MIN_POLYGON_POINTS {
            tracing::debug!(border = border.len(), "too few border nodes for a flood polygon");
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(BoundaryError::Cancelled);
        }

        let keys: Vec<(i64, i64)> = border.iter().map(|&idx| self.key(view, idx)).collect();
        let clusters = match self.options.hull_mode {
            HullMode::Single => vec![(0..keys.len() as u32).collect()],
            HullMode::Clustered => self.cluster(&keys, cancel)?,
        };

        let scale = self.options.coordinate_scale;
        let mut polygons = Vec::new();
        for members in clusters {
            if cancel.is_cancelled() {
                return Err(BoundaryError::Cancelled);
            }
            if members.len() < MIN_POLYGON_POINTS {
                continue;
            }
            let points: Vec<(i64, i64)> = members.iter().map(|&m| keys[m as usize]).collect();
            if let Some(ring) = convex_ring(&points) {
                polygons.push(FloodPolygon {
                    vertices: ring
                        .into_iter()
                        .map(|(lat, lng)| LatLng::new(from_fixed(lat, scale), from_fixed(lng, scale)))
                        .collect(),
                });
            }
        }

        tracing::debug!(
            border = border.len(),
            polygons = polygons.len(),
            mode = ?self.options.hull_mode,
            "extracted flood polygons"
        );
        Ok(polygons)
    }

    /// Link border nodes lying within one offset of each other on both axes.
    fn cluster(
        &self,
        keys: &[(i64, i64)],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<u32>>, BoundaryError> {
        let offset = self.offset_units();
        let cell_of = |(lat, lng): (i64, i64)| (lat.div_euclid(offset), lng.div_euclid(offset));

        let mut cells: FxHashMap<(i64, i64), Vec<u32>> = FxHashMap::default();
        for (i, &key) in keys.iter().enumerate() {
            cells.entry(cell_of(key)).or_default().push(i as u32);
        }

        let mut sets = DisjointSet::new(keys.len());
        for (i, &(lat, lng)) in keys.iter().enumerate() {
            if i % 4096 == 0 && cancel.is_cancelled() {
                return Err(BoundaryError::Cancelled);
            }
            let (cell_lat, cell_lng) = cell_of((lat, lng));
            for dlat in -1..=1 {
                for dlng in -1..=1 {
                    let Some(bucket) = cells.get(&(cell_lat + dlat, cell_lng + dlng)) else {
                        continue;
                    };
                    for &j in bucket {
                        let (other_lat, other_lng) = keys[j as usize];
                        if j as usize > i
                            && (other_lat - lat).abs() <= offset
                            && (other_lng - lng).abs() <= offset
                        {
                            sets.union(i as u32, j);
                        }
                    }
                }
            }
        }

        Ok(sets.groups())
    }
}

/// Convex hull of fixed-point `(lat, lng)` points as an open ring.
///
/// Returns `None` when the hull has no area (fewer than 3 distinct points or
/// all points collinear).
fn convex_ring(points: &[(i64, i64)]) -> Option<Vec<(i64, i64)>> {
    let multi_point: MultiPoint<f64> = points
        .iter()
        .map(|&(lat, lng)| Coord {
            x: lng as f64,
            y: lat as f64,
        })
        .collect();
    let hull = multi_point.convex_hull();

    let mut ring: Vec<(i64, i64)> = hull
        .exterior()
        .coords()
        .map(|c| (c.y as i64, c.x as i64))
        .collect();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring.dedup();

    if ring.len() < MIN_POLYGON_POINTS || doubled_area(&ring) == 0 {
        return None;
    }
    Some(ring)
}

fn doubled_area(ring: &[(i64, i64)]) -> i128 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let (y1, x1) = ring[i];
            let (y2, x2) = ring[(i + 1) % n];
            x1 as i128 * y2 as i128 - x2 as i128 * y1 as i128
        })
        .sum()
}

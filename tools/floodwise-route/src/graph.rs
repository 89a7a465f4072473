//! Immutable road network graph
//!
//! Nodes live in a dense arena addressed by `u32` index; outgoing edges are
//! stored CSR-style (`offsets[i]..offsets[i + 1]` into `edges`). Anything
//! derived per request (flood classification, search state) indexes into this
//! arena instead of copying it.

use anyhow::{Context, Result};
use floodwise_common::{LatLng, NetworkType};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// A road network vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    /// Meters above sea level; `None` when the provider had no value
    pub elevation: Option<f64>,
}

impl Node {
    pub fn coord(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Directed road segment between two node ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: i64,
    pub target: i64,
    pub length_m: f64,
    /// Rise over run; only present when both endpoints have an elevation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("duplicate node id {0}")]
    DuplicateNode(i64),
    #[error("edge {from} -> {to} references a missing node")]
    DanglingEdge { from: i64, to: i64 },
    #[error("edge {from} -> {to} has non-positive length {length_m}")]
    InvalidLength { from: i64, to: i64, length_m: f64 },
}

/// Node position for the R-tree
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexedNode {
    pub coords: [f64; 2], // [lng, lat]
    pub idx: u32,
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.coords == *point
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SerializableGraph {
    place: String,
    network_type: NetworkType,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

#[derive(Debug)]
pub struct RoadNetworkGraph {
    place: String,
    network_type: NetworkType,
    nodes: Vec<Node>,
    /// Sorted by source index, parallel to `targets`
    edges: Vec<Edge>,
    targets: Vec<u32>,
    offsets: Vec<u32>,
    node_index: FxHashMap<i64, u32>,
    spatial_index: RTree<IndexedNode>,
}

impl RoadNetworkGraph {
    /// Build a graph from nodes and `(source, target, length_m)` edges.
    ///
    /// Grades are derived from node elevations. Every edge must reference two
    /// existing nodes and have a positive, finite length.
    pub fn from_parts(
        place: impl Into<String>,
        network_type: NetworkType,
        nodes: Vec<Node>,
        edges: Vec<(i64, i64, f64)>,
    ) -> Result<Self, GraphError> {
        let mut node_index = FxHashMap::default();
        node_index.reserve(nodes.len());
        for (idx, node) in nodes.iter().enumerate() {
            if node_index.insert(node.id, idx as u32).is_some() {
                return Err(GraphError::DuplicateNode(node.id));
            }
        }

        let mut resolved = Vec::with_capacity(edges.len());
        for (source, target, length_m) in edges {
            let (Some(&s), Some(&t)) = (node_index.get(&source), node_index.get(&target)) else {
                return Err(GraphError::DanglingEdge { from: source, to: target });
            };
            if !(length_m.is_finite() && length_m > 0.0) {
                return Err(GraphError::InvalidLength {
                    from: source,
                    to: target,
                    length_m,
                });
            }
            let grade = match (nodes[s as usize].elevation, nodes[t as usize].elevation) {
                (Some(es), Some(et)) => Some((et - es) / length_m),
                _ => None,
            };
            resolved.push((s, t, Edge { source, target, length_m, grade }));
        }

        // Stable sort keeps the provider's edge order within a source node,
        // which keeps search exploration order reproducible.
        resolved.sort_by_key(|(s, _, _)| *s);

        let mut offsets = vec![0u32; nodes.len() + 1];
        for (s, _, _) in &resolved {
            offsets[*s as usize + 1] += 1;
        }
        for i in 0..nodes.len() {
            offsets[i + 1] += offsets[i];
        }

        let (targets, edges): (Vec<u32>, Vec<Edge>) =
            resolved.into_iter().map(|(_, t, e)| (t, e)).unzip();

        let points: Vec<IndexedNode> = nodes
            .iter()
            .enumerate()
            .map(|(idx, n)| IndexedNode {
                coords: [n.lng, n.lat],
                idx: idx as u32,
            })
            .collect();

        Ok(Self {
            place: place.into(),
            network_type,
            nodes,
            edges,
            targets,
            offsets,
            node_index,
            spatial_index: RTree::bulk_load(points),
        })
    }

    pub fn place(&self) -> &str {
        &self.place
    }

    pub fn network_type(&self) -> NetworkType {
        self.network_type
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    pub fn coord(&self, idx: u32) -> LatLng {
        self.nodes[idx as usize].coord()
    }

    pub fn index_of(&self, id: i64) -> Option<u32> {
        self.node_index.get(&id).copied()
    }

    /// Outgoing edges of `idx` as `(target index, edge)`
    pub fn out_edges(&self, idx: u32) -> impl Iterator<Item = (u32, &Edge)> + '_ {
        let start = self.offsets[idx as usize] as usize;
        let end = self.offsets[idx as usize + 1] as usize;
        self.targets[start..end]
            .iter()
            .copied()
            .zip(self.edges[start..end].iter())
    }

    /// Node indices ordered by planar distance (in degrees) from `at`
    pub fn nearest_iter(&self, at: LatLng) -> impl Iterator<Item = u32> + '_ {
        self.spatial_index
            .nearest_neighbor_iter(&[at.lng, at.lat])
            .map(|p| p.idx)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serializable = SerializableGraph {
            place: self.place.clone(),
            network_type: self.network_type,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        };

        let file = File::create(path).context("Failed to create graph file")?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &serializable).context("Failed to serialize graph")?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).context("Failed to open graph file")?;
        let reader = BufReader::new(file);
        let serializable: SerializableGraph =
            serde_json::from_reader(reader).context("Failed to deserialize graph")?;

        let edges = serializable
            .edges
            .into_iter()
            .map(|e| (e.source, e.target, e.length_m))
            .collect();

        Ok(Self::from_parts(
            serializable.place,
            serializable.network_type,
            serializable.nodes,
            edges,
        )?)
    }
}

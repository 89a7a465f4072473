//! Flood classification
//!
//! A [`FloodView`] marks every node of a borrowed graph as flooded or dry at
//! one water level. The classification is a bitset indexed by node index
//! (bit set = flooded), built fresh per request; the graph itself is never
//! touched.

use rayon::prelude::*;
use thiserror::Error;

use crate::graph::RoadNetworkGraph;

/// Graphs smaller than this are classified on the calling thread
const PARALLEL_THRESHOLD: usize = 1 << 16;

#[derive(Debug, Error, PartialEq)]
pub enum FloodError {
    #[error("water level must be a finite number, got {0}")]
    InvalidWaterLevel(f64),
}

/// Per-request flooded/dry partition of a graph's nodes
#[derive(Debug, Clone)]
pub struct FloodView<'g> {
    graph: &'g RoadNetworkGraph,
    water_level: f64,
    flooded: Vec<u64>,
    flooded_count: usize,
}

impl<'g> FloodView<'g> {
    /// Classify every node of `graph` at `water_level`.
    ///
    /// A node is flooded when `elevation - water_level < 0`. Nodes without an
    /// elevation are never flooded. Deterministic: the same graph and level
    /// always produce the same bitset.
    pub fn classify(graph: &'g RoadNetworkGraph, water_level: f64) -> Result<Self, FloodError> {
        if !water_level.is_finite() {
            return Err(FloodError::InvalidWaterLevel(water_level));
        }

        let nodes = graph.nodes();
        let word_for = |chunk: &[crate::graph::Node]| -> u64 {
            chunk.iter().enumerate().fold(0u64, |word, (bit, node)| {
                match node.elevation {
                    Some(elev) if elev - water_level < 0.0 => word | (1u64 << bit),
                    _ => word,
                }
            })
        };

        let flooded: Vec<u64> = if nodes.len() >= PARALLEL_THRESHOLD {
            nodes.par_chunks(64).map(word_for).collect()
        } else {
            nodes.chunks(64).map(word_for).collect()
        };
        let flooded_count = flooded.iter().map(|w| w.count_ones() as usize).sum();

        tracing::debug!(
            place = graph.place(),
            water_level,
            flooded = flooded_count,
            total = nodes.len(),
            "classified flood view"
        );

        Ok(Self {
            graph,
            water_level,
            flooded,
            flooded_count,
        })
    }

    pub fn graph(&self) -> &'g RoadNetworkGraph {
        self.graph
    }

    pub fn water_level(&self) -> f64 {
        self.water_level
    }

    #[inline]
    pub fn is_flooded(&self, idx: u32) -> bool {
        let word = idx as usize / 64;
        let bit = idx as usize % 64;
        word < self.flooded.len() && (self.flooded[word] & (1u64 << bit)) != 0
    }

    #[inline]
    pub fn is_dry(&self, idx: u32) -> bool {
        !self.is_flooded(idx)
    }

    /// Elevation relative to the water surface; negative means submerged
    pub fn adjusted_elevation(&self, idx: u32) -> Option<f64> {
        self.graph
            .node(idx)
            .elevation
            .map(|elev| elev - self.water_level)
    }

    pub fn flooded_count(&self) -> usize {
        self.flooded_count
    }

    pub fn dry_count(&self) -> usize {
        self.graph.node_count() - self.flooded_count
    }

    pub fn flooded_indices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.graph.node_count() as u32).filter(move |&idx| self.is_flooded(idx))
    }

    pub fn dry_indices(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.graph.node_count() as u32).filter(move |&idx| self.is_dry(idx))
    }
}

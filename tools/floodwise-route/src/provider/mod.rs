//! Road network and elevation providers
//!
//! A [`NetworkSource`] turns a place name into raw OSM-like nodes and ways;
//! an [`ElevationSource`] attaches an elevation to coordinates. Both are
//! injected into the graph store, so tests and offline deployments can swap
//! the HTTP implementations for local ones.

pub mod file;
pub mod opentopodata;
pub mod overpass;
pub mod srtm;

pub use file::FileSource;
pub use opentopodata::OpenTopoDataSource;
pub use overpass::OverpassSource;
pub use srtm::SrtmSource;

use floodwise_common::{LatLng, NetworkType};
use futures::future::BoxFuture;
use futures::FutureExt;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::components::DisjointSet;
use crate::geo::haversine_distance;
use crate::graph::Node;

/// Segments shorter than this are clamped so every edge has a positive length
const MIN_EDGE_LENGTH_M: f64 = 0.01;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("Elevation unavailable: {0}")]
    Elevation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Map a non-success HTTP status to a provider error.
///
/// Rate limiting and server errors are transient and get retried.
pub(crate) fn http_status_error(url: &str, status: reqwest::StatusCode) -> ProviderError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Network(format!("{url} returned {status}"))
    } else {
        ProviderError::InvalidResponse(format!("{url} returned {status}"))
    }
}

/// Exponential backoff for transient network failures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time and
    /// saturating instead of overflowing
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor)
    }
}

/// Run `operation`, retrying only [`ProviderError::Network`] failures
pub(crate) async fn retry_on_network_error<F, Fut, T>(
    policy: RetryPolicy,
    what: &str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(ProviderError::Network(msg)) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff_ms(attempt);
                tracing::warn!(attempt, delay_ms = delay, error = %msg, "{what} failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Travel direction allowed along a way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oneway {
    #[default]
    No,
    /// Only in node order
    Forward,
    /// Only against node order
    Backward,
}

impl Oneway {
    /// Interpret OSM `oneway`/`junction` tags
    pub fn from_tags(oneway: Option<&str>, junction: Option<&str>) -> Self {
        match oneway.map(str::trim) {
            Some("yes" | "true" | "1") => Oneway::Forward,
            Some("-1" | "reverse") => Oneway::Backward,
            Some(_) => Oneway::No,
            None if junction == Some("roundabout") => Oneway::Forward,
            None => Oneway::No,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    pub elevation: Option<f64>,
}

/// Polyline of node ids; consecutive pairs become edges
#[derive(Debug, Clone, PartialEq)]
pub struct RawWay {
    pub nodes: Vec<i64>,
    pub oneway: Oneway,
}

/// Already-directed segment with a known length
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub source: i64,
    pub target: i64,
    pub length_m: f64,
}

/// Provider output before graph assembly
#[derive(Debug, Clone, Default)]
pub struct RawNetwork {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub edges: Vec<RawEdge>,
}

/// Nodes and directed edges ready for [`crate::graph::RoadNetworkGraph::from_parts`]
#[derive(Debug, Clone, Default)]
pub struct NetworkParts {
    pub nodes: Vec<Node>,
    pub edges: Vec<(i64, i64, f64)>,
}

impl RawNetwork {
    /// Expand ways into directed edges and drop nodes no edge touches.
    ///
    /// Ways or edges referencing unknown nodes are dropped. One-way tags are
    /// honoured only for network types that respect them. With
    /// `largest_component_only`, everything outside the largest weakly
    /// connected component is discarded.
    pub fn into_parts(self, network_type: NetworkType, largest_component_only: bool) -> NetworkParts {
        let positions: FxHashMap<i64, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();

        let mut edges = Vec::new();
        let mut dropped_ways = 0usize;
        for way in &self.ways {
            let Some(idx) = way
                .nodes
                .iter()
                .map(|id| positions.get(id).copied())
                .collect::<Option<Vec<usize>>>()
            else {
                dropped_ways += 1;
                continue;
            };

            let oneway = if network_type.respects_oneway() {
                way.oneway
            } else {
                Oneway::No
            };
            for pair in idx.windows(2) {
                let (a, b) = (&self.nodes[pair[0]], &self.nodes[pair[1]]);
                if a.id == b.id {
                    continue;
                }
                let length = haversine_distance(a.lat, a.lng, b.lat, b.lng).max(MIN_EDGE_LENGTH_M);
                match oneway {
                    Oneway::No => {
                        edges.push((a.id, b.id, length));
                        edges.push((b.id, a.id, length));
                    }
                    Oneway::Forward => edges.push((a.id, b.id, length)),
                    Oneway::Backward => edges.push((b.id, a.id, length)),
                }
            }
        }

        let explicit = self.edges.len();
        let before = edges.len();
        edges.extend(
            self.edges
                .iter()
                .filter(|e| {
                    e.source != e.target
                        && positions.contains_key(&e.source)
                        && positions.contains_key(&e.target)
                })
                .map(|e| (e.source, e.target, e.length_m.max(MIN_EDGE_LENGTH_M))),
        );
        let dropped_edges = explicit - (edges.len() - before);
        if dropped_ways > 0 || dropped_edges > 0 {
            tracing::warn!(dropped_ways, dropped_edges, "ignored segments referencing missing nodes");
        }

        let mut keep: FxHashSet<i64> = edges.iter().flat_map(|&(s, t, _)| [s, t]).collect();

        if largest_component_only && !keep.is_empty() {
            let mut sets = DisjointSet::new(self.nodes.len());
            for &(s, t, _) in &edges {
                sets.union(positions[&s] as u32, positions[&t] as u32);
            }
            let largest = sets
                .groups()
                .into_iter()
                .filter(|g| keep.contains(&self.nodes[g[0] as usize].id))
                .max_by_key(|g| g.len())
                .unwrap_or_default();
            let component: FxHashSet<i64> = largest.iter().map(|&i| self.nodes[i as usize].id).collect();
            edges.retain(|(s, _, _)| component.contains(s));
            keep = component;
        }

        // removing on first sight also drops repeated node ids
        let nodes = self
            .nodes
            .into_iter()
            .filter(|n| keep.remove(&n.id))
            .map(|n| Node {
                id: n.id,
                lat: n.lat,
                lng: n.lng,
                elevation: n.elevation,
            })
            .collect();

        NetworkParts { nodes, edges }
    }
}

/// Resolves a place name into a raw road network
pub trait NetworkSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        place: &'a str,
        network_type: NetworkType,
    ) -> BoxFuture<'a, Result<RawNetwork, ProviderError>>;
}

/// Looks up ground elevation in meters, one value per coordinate
pub trait ElevationSource: Send + Sync {
    fn elevations<'a>(
        &'a self,
        coords: &'a [LatLng],
    ) -> BoxFuture<'a, Result<Vec<Option<f64>>, ProviderError>>;
}

/// Elevation source that knows nothing; every node stays dry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoElevation;

impl ElevationSource for NoElevation {
    fn elevations<'a>(
        &'a self,
        coords: &'a [LatLng],
    ) -> BoxFuture<'a, Result<Vec<Option<f64>>, ProviderError>> {
        futures::future::ready(Ok(vec![None; coords.len()])).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn raw_node(id: i64, lat: f64, lng: f64) -> RawNode {
        RawNode {
            id,
            lat,
            lng,
            elevation: None,
        }
    }

    fn way(nodes: &[i64], oneway: Oneway) -> RawWay {
        RawWay {
            nodes: nodes.to_vec(),
            oneway,
        }
    }

    fn sample() -> RawNetwork {
        RawNetwork {
            nodes: vec![
                raw_node(1, 45.0, 1.0),
                raw_node(2, 45.001, 1.0),
                raw_node(3, 45.002, 1.0),
                // island
                raw_node(10, 46.0, 1.0),
                raw_node(11, 46.001, 1.0),
                // unused
                raw_node(99, 47.0, 1.0),
            ],
            ways: vec![
                way(&[1, 2, 3], Oneway::Forward),
                way(&[10, 11], Oneway::No),
                way(&[3, 404], Oneway::No),
            ],
            edges: vec![],
        }
    }

    #[test]
    fn test_oneway_tags() {
        assert_eq!(Oneway::from_tags(Some("yes"), None), Oneway::Forward);
        assert_eq!(Oneway::from_tags(Some("-1"), None), Oneway::Backward);
        assert_eq!(Oneway::from_tags(Some("no"), Some("roundabout")), Oneway::No);
        assert_eq!(Oneway::from_tags(None, Some("roundabout")), Oneway::Forward);
        assert_eq!(Oneway::from_tags(None, None), Oneway::No);
    }

    #[test]
    fn test_drive_respects_oneway() {
        let parts = sample().into_parts(NetworkType::Drive, false);
        let pairs: Vec<(i64, i64)> = parts.edges.iter().map(|&(s, t, _)| (s, t)).collect();
        assert_eq!(pairs, vec![(1, 2), (2, 3), (10, 11), (11, 10)]);
        // the way through the missing node 404 is dropped, unused nodes too
        let ids: Vec<i64> = parts.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 10, 11]);
        let (_, _, length) = parts.edges[0];
        assert!((length - 111.2).abs() < 1.0, "got {length}");
    }

    #[test]
    fn test_walk_ignores_oneway() {
        let parts = sample().into_parts(NetworkType::Walk, false);
        assert!(parts.edges.iter().any(|&(s, t, _)| (s, t) == (2, 1)));
        assert_eq!(parts.edges.len(), 6);
    }

    #[test]
    fn test_largest_component_only() {
        let parts = sample().into_parts(NetworkType::Drive, true);
        let ids: Vec<i64> = parts.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(parts.edges.len(), 2);
    }

    #[test]
    fn test_explicit_edges_and_zero_length_clamp() {
        let raw = RawNetwork {
            nodes: vec![raw_node(1, 45.0, 1.0), raw_node(2, 45.0, 1.0)],
            ways: vec![],
            edges: vec![
                RawEdge { source: 1, target: 2, length_m: 0.0 },
                RawEdge { source: 2, target: 7, length_m: 5.0 },
            ],
        };
        let parts = raw.into_parts(NetworkType::Drive, false);
        assert_eq!(parts.edges, vec![(1, 2, MIN_EDGE_LENGTH_M)]);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(1), 1_000);
        assert_eq!(policy.backoff_ms(3), 4_000);
        assert_eq!(policy.backoff_ms(64), u64::MAX);
        assert_eq!(policy.backoff_ms(200), u64::MAX);
        assert_eq!(RetryPolicy::none().backoff_ms(100), 0);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_non_network_errors() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy { max_retries: 3, base_delay_ms: 1 };
        let result: Result<(), _> = retry_on_network_error(policy, "lookup", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::InvalidResponse("bad".into()))
        })
        .await;
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_network_errors() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let policy = RetryPolicy { max_retries: 3, base_delay_ms: 1 };
        let result = retry_on_network_error(policy, "lookup", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::Network("reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_elevation() {
        let coords = [LatLng::new(45.0, 1.0), LatLng::new(45.1, 1.1)];
        assert_eq!(NoElevation.elevations(&coords).await.unwrap(), vec![None, None]);
    }
}

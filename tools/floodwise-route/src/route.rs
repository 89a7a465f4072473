use floodwise_common::LatLng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::flood::FloodView;
use crate::geo::haversine;

/// How many settled nodes between two cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Origin,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Origin => f.write_str("origin"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("No dry road node within reach of the {0}")]
    NoNearbyNode(Endpoint),

    #[error("No route avoids the flooded area between origin and destination")]
    NoRouteFound,

    #[error("Route search cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Farthest a request coordinate may be from its snapped dry node
    pub max_snap_distance_m: f64,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            max_snap_distance_m: 5_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub coordinates: Vec<LatLng>,
    pub node_ids: Vec<i64>,
    pub distance_m: f64,
}

/// Induced subgraph of dry nodes and edges whose endpoints are both dry.
///
/// Borrowed from a [`FloodView`]; nothing is copied.
pub struct DrySubgraph<'v, 'g> {
    view: &'v FloodView<'g>,
}

impl<'v, 'g> DrySubgraph<'v, 'g> {
    pub fn new(view: &'v FloodView<'g>) -> Self {
        Self { view }
    }

    pub fn contains(&self, idx: u32) -> bool {
        self.view.is_dry(idx)
    }

    /// Dry successors of a dry node with edge lengths
    pub fn neighbors(&self, idx: u32) -> impl Iterator<Item = (u32, f64)> + '_ {
        let source_dry = self.view.is_dry(idx);
        self.view
            .graph()
            .out_edges(idx)
            .filter(move |(target, _)| source_dry && self.view.is_dry(*target))
            .map(|(target, edge)| (target, edge.length_m))
    }

    /// Nearest dry node to `at`, if one lies within `max_distance_m`
    pub fn snap(&self, at: LatLng, max_distance_m: f64) -> Option<u32> {
        if self.view.dry_count() == 0 {
            return None;
        }
        let graph = self.view.graph();
        let idx = graph.nearest_iter(at).find(|&idx| self.view.is_dry(idx))?;
        (haversine(at, graph.coord(idx)) <= max_distance_m).then_some(idx)
    }
}

// Dijkstra heap entry; ties on cost resolve to the lower node index
#[derive(Clone, Copy, Debug)]
struct State {
    cost: f64,
    node: u32,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Shortest paths over the dry part of a flooded graph
#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    options: RouteOptions,
}

impl PathFinder {
    pub fn new(options: RouteOptions) -> Self {
        Self { options }
    }

    /// Shortest dry route between two coordinates.
    ///
    /// Both coordinates snap to their nearest dry node. Returns
    /// [`RouteError::NoRouteFound`] when the snapped nodes are disconnected
    /// in the dry subgraph.
    pub fn route(
        &self,
        view: &FloodView<'_>,
        origin: LatLng,
        destination: LatLng,
        cancel: &CancellationToken,
    ) -> Result<Route, RouteError> {
        let dry = DrySubgraph::new(view);
        let max_snap = self.options.max_snap_distance_m;

        let start = dry
            .snap(origin, max_snap)
            .ok_or(RouteError::NoNearbyNode(Endpoint::Origin))?;
        let goal = dry
            .snap(destination, max_snap)
            .ok_or(RouteError::NoNearbyNode(Endpoint::Destination))?;

        let graph = view.graph();
        tracing::debug!(
            start = graph.node(start).id,
            goal = graph.node(goal).id,
            water_level = view.water_level(),
            "routing over dry subgraph"
        );

        let (distance_m, path) = shortest_path(&dry, start, goal, graph.node_count(), cancel)?;

        Ok(Route {
            coordinates: path.iter().map(|&idx| graph.coord(idx)).collect(),
            node_ids: path.iter().map(|&idx| graph.node(idx).id).collect(),
            distance_m,
        })
    }
}

fn shortest_path(
    dry: &DrySubgraph<'_, '_>,
    start: u32,
    goal: u32,
    n_nodes: usize,
    cancel: &CancellationToken,
) -> Result<(f64, Vec<u32>), RouteError> {
    let mut dist = vec![f64::INFINITY; n_nodes];
    let mut prev = vec![u32::MAX; n_nodes];
    let mut heap = BinaryHeap::new();

    dist[start as usize] = 0.0;
    heap.push(State { cost: 0.0, node: start });

    let mut settled = 0usize;
    while let Some(State { cost, node }) = heap.pop() {
        if cost > dist[node as usize] {
            continue;
        }

        settled += 1;
        if settled % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(RouteError::Cancelled);
        }

        if node == goal {
            let mut path = vec![goal];
            let mut current = goal;
            while prev[current as usize] != u32::MAX {
                current = prev[current as usize];
                path.push(current);
            }
            path.reverse();
            tracing::debug!(settled, distance_m = cost, hops = path.len(), "route found");
            return Ok((cost, path));
        }

        for (next, length) in dry.neighbors(node) {
            let candidate = cost + length;
            if candidate < dist[next as usize] {
                dist[next as usize] = candidate;
                prev[next as usize] = node;
                heap.push(State {
                    cost: candidate,
                    node: next,
                });
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(RouteError::Cancelled);
    }
    Err(RouteError::NoRouteFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, RoadNetworkGraph};
    use crate::testutil::{grid_graph, plus_graph};
    use floodwise_common::NetworkType;

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_route_on_dry_grid_is_shortest() {
        let g = grid_graph(5, 5, |_, _| Some(10.0));
        let view = FloodView::classify(&g, 0.0).unwrap();
        let route = PathFinder::default()
            .route(&view, g.coord(0), g.coord(24), &no_cancel())
            .unwrap();

        // 4 steps north + 4 steps east
        assert_eq!(route.node_ids.len(), 9);
        assert_eq!(route.node_ids.first(), Some(&0));
        assert_eq!(route.node_ids.last(), Some(&24));
        assert_eq!(route.coordinates.first(), Some(&g.coord(0)));
    }

    #[test]
    fn test_route_avoids_flooded_nodes() {
        // Low-lying middle column except for the top row
        let g = grid_graph(5, 5, |r, c| if c == 2 && r < 4 { Some(-1.0) } else { Some(5.0) });
        let view = FloodView::classify(&g, 0.0).unwrap();
        let route = PathFinder::default()
            .route(&view, g.coord(0), g.coord(4), &no_cancel())
            .unwrap();

        for id in &route.node_ids {
            let idx = g.index_of(*id).unwrap();
            assert!(view.is_dry(idx), "route crosses flooded node {id}");
        }
        // must detour through row 4
        assert!(route.node_ids.contains(&22));
    }

    #[test]
    fn test_route_validity_across_levels() {
        let g = grid_graph(6, 6, |r, c| Some((r * 6 + c) as f64 % 7.0 - 1.0));
        for level in [0.0, 1.0, 2.5] {
            let view = FloodView::classify(&g, level).unwrap();
            match PathFinder::default().route(&view, g.coord(0), g.coord(35), &no_cancel()) {
                Ok(route) => {
                    for id in &route.node_ids {
                        assert!(view.is_dry(g.index_of(*id).unwrap()));
                    }
                }
                Err(RouteError::NoRouteFound) | Err(RouteError::NoNearbyNode(_)) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_plus_shape_disconnects() {
        let g = plus_graph();
        let view = FloodView::classify(&g, 0.0).unwrap();
        assert_eq!(view.flooded_count(), 3);

        let west = g.coord(g.index_of(0).unwrap());
        let east = g.coord(g.index_of(4).unwrap());
        let result = PathFinder::default().route(&view, west, east, &no_cancel());
        assert_eq!(result.unwrap_err(), RouteError::NoRouteFound);
    }

    #[test]
    fn test_snaps_to_nearest_dry_node() {
        let g = grid_graph(3, 3, |r, c| if (r, c) == (0, 0) { Some(-5.0) } else { Some(5.0) });
        let view = FloodView::classify(&g, 0.0).unwrap();
        let route = PathFinder::default()
            .route(&view, g.coord(0), g.coord(8), &no_cancel())
            .unwrap();
        assert_ne!(route.node_ids[0], 0);
        assert!(route.node_ids[0] == 1 || route.node_ids[0] == 3);
    }

    #[test]
    fn test_no_nearby_node_when_everything_flooded() {
        let g = grid_graph(3, 3, |_, _| Some(1.0));
        let view = FloodView::classify(&g, 2.0).unwrap();
        let err = PathFinder::default()
            .route(&view, g.coord(0), g.coord(8), &no_cancel())
            .unwrap_err();
        assert_eq!(err, RouteError::NoNearbyNode(Endpoint::Origin));
    }

    #[test]
    fn test_no_nearby_node_beyond_tolerance() {
        let g = grid_graph(3, 3, |_, _| Some(1.0));
        let view = FloodView::classify(&g, 0.0).unwrap();
        let finder = PathFinder::new(RouteOptions {
            max_snap_distance_m: 100.0,
        });
        let far_away = LatLng::new(46.0, 1.0);
        let err = finder
            .route(&view, g.coord(0), far_away, &no_cancel())
            .unwrap_err();
        assert_eq!(err, RouteError::NoNearbyNode(Endpoint::Destination));
    }

    #[test]
    fn test_same_node_route() {
        let g = grid_graph(2, 2, |_, _| Some(1.0));
        let view = FloodView::classify(&g, 0.0).unwrap();
        let route = PathFinder::default()
            .route(&view, g.coord(3), g.coord(3), &no_cancel())
            .unwrap();
        assert_eq!(route.node_ids, vec![3]);
        assert_eq!(route.distance_m, 0.0);
    }

    #[test]
    fn test_respects_edge_direction() {
        let nodes = vec![
            Node { id: 1, lat: 45.0, lng: 1.0, elevation: Some(3.0) },
            Node { id: 2, lat: 45.001, lng: 1.0, elevation: Some(3.0) },
        ];
        let g = RoadNetworkGraph::from_parts("oneway", NetworkType::Drive, nodes, vec![(1, 2, 111.0)])
            .unwrap();
        let view = FloodView::classify(&g, 0.0).unwrap();
        let finder = PathFinder::default();
        assert!(finder.route(&view, g.coord(0), g.coord(1), &no_cancel()).is_ok());
        assert_eq!(
            finder.route(&view, g.coord(1), g.coord(0), &no_cancel()).unwrap_err(),
            RouteError::NoRouteFound
        );
    }

    #[test]
    fn test_cancelled_search() {
        let g = grid_graph(40, 40, |_, _| Some(1.0));
        let view = FloodView::classify(&g, 0.0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PathFinder::default()
            .route(&view, g.coord(0), g.coord(1599), &cancel)
            .unwrap_err();
        assert_eq!(err, RouteError::Cancelled);
    }

    #[test]
    fn test_routes_are_reproducible() {
        let g = grid_graph(6, 6, |_, _| Some(1.0));
        let view = FloodView::classify(&g, 0.0).unwrap();
        let finder = PathFinder::default();
        let first = finder.route(&view, g.coord(0), g.coord(35), &no_cancel()).unwrap();
        for _ in 0..5 {
            let again = finder.route(&view, g.coord(0), g.coord(35), &no_cancel()).unwrap();
            assert_eq!(again.node_ids, first.node_ids);
        }
    }
}

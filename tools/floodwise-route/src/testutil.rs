//! Synthetic graphs shared by unit tests

use floodwise_common::NetworkType;

use crate::geo::haversine_distance;
use crate::graph::{Node, RoadNetworkGraph};

/// Spacing between grid nodes, matching the flood border neighbour offset
pub const GRID_SPACING: f64 = 0.0002;

/// `rows x cols` lattice with two-way edges to the 4 direct neighbours.
///
/// Node `(r, c)` has id `r * cols + c` and sits at
/// `(45 + r * GRID_SPACING, 1 + c * GRID_SPACING)`.
pub fn grid_graph<F>(rows: usize, cols: usize, elevation: F) -> RoadNetworkGraph
where
    F: Fn(usize, usize) -> Option<f64>,
{
    let mut nodes = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            nodes.push(Node {
                id: (r * cols + c) as i64,
                lat: 45.0 + r as f64 * GRID_SPACING,
                lng: 1.0 + c as f64 * GRID_SPACING,
                elevation: elevation(r, c),
            });
        }
    }

    let mut edges = Vec::new();
    let mut link = |a: usize, b: usize| {
        let (na, nb) = (&nodes[a], &nodes[b]);
        let d = haversine_distance(na.lat, na.lng, nb.lat, nb.lng);
        edges.push((na.id, nb.id, d));
        edges.push((nb.id, na.id, d));
    };
    for r in 0..rows {
        for c in 0..cols {
            let here = r * cols + c;
            if c + 1 < cols {
                link(here, here + 1);
            }
            if r + 1 < rows {
                link(here, here + cols);
            }
        }
    }

    RoadNetworkGraph::from_parts("grid", NetworkType::Drive, nodes, edges)
        .expect("grid graph is well formed")
}

/// Five nodes in a plus: west(0), centre(1), north(2), south(3), east(4),
/// with elevations `[2, -1, -1, -1, 2]` and two-way edges from the centre.
pub fn plus_graph() -> RoadNetworkGraph {
    let (lat, lng, d) = (45.0, 1.0, GRID_SPACING);
    let nodes = vec![
        Node { id: 0, lat, lng: lng - d, elevation: Some(2.0) },
        Node { id: 1, lat, lng, elevation: Some(-1.0) },
        Node { id: 2, lat: lat + d, lng, elevation: Some(-1.0) },
        Node { id: 3, lat: lat - d, lng, elevation: Some(-1.0) },
        Node { id: 4, lat, lng: lng + d, elevation: Some(2.0) },
    ];
    let mut edges = Vec::new();
    for arm in [0, 2, 3, 4] {
        edges.push((1, arm, 22.0));
        edges.push((arm, 1, 22.0));
    }
    RoadNetworkGraph::from_parts("plus", NetworkType::Drive, nodes, edges)
        .expect("plus graph is well formed")
}

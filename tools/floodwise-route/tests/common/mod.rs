//! In-memory road networks for integration tests

#![allow(dead_code)]

use floodwise_common::{normalize_place, LatLng, NetworkType};
use floodwise_route::provider::{
    ElevationSource, NetworkSource, NoElevation, Oneway, ProviderError, RawNetwork, RawNode, RawWay,
};
use floodwise_route::{EvacuationService, GraphStore, StoreOptions};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SPACING: f64 = 0.0002;

/// Network source serving fixed networks by place name
#[derive(Default)]
pub struct MemorySource {
    networks: HashMap<String, RawNetwork>,
    fetches: AtomicUsize,
    delay: Duration,
    outage: bool,
}

impl MemorySource {
    pub fn with(mut self, place: &str, network: RawNetwork) -> Self {
        self.networks.insert(normalize_place(place), network);
        self
    }

    /// Every fetch takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every fetch fails with a network error
    pub fn offline(mut self) -> Self {
        self.outage = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl NetworkSource for MemorySource {
    fn fetch<'a>(
        &'a self,
        place: &'a str,
        _network_type: NetworkType,
    ) -> BoxFuture<'a, Result<RawNetwork, ProviderError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.outage {
                return Err(ProviderError::Network("connection refused".into()));
            }
            self.networks
                .get(&normalize_place(place))
                .cloned()
                .ok_or_else(|| ProviderError::PlaceNotFound(place.to_string()))
        }
        .boxed()
    }
}

/// Elevation source whose upstream is always failing
pub struct BrokenElevation;

impl ElevationSource for BrokenElevation {
    fn elevations<'a>(
        &'a self,
        _coords: &'a [LatLng],
    ) -> BoxFuture<'a, Result<Vec<Option<f64>>, ProviderError>> {
        futures::future::ready(Err(ProviderError::Elevation("rate limit exceeded".into()))).boxed()
    }
}

fn two_way(a: i64, b: i64) -> RawWay {
    RawWay {
        nodes: vec![a, b],
        oneway: Oneway::No,
    }
}

/// `rows x cols` lattice at `(45 + r * SPACING, 1 + c * SPACING)`, id `r * cols + c`
pub fn grid_network<F>(rows: usize, cols: usize, elevation: F) -> RawNetwork
where
    F: Fn(usize, usize) -> Option<f64>,
{
    let mut raw = RawNetwork::default();
    for r in 0..rows {
        for c in 0..cols {
            raw.nodes.push(RawNode {
                id: (r * cols + c) as i64,
                lat: 45.0 + r as f64 * SPACING,
                lng: 1.0 + c as f64 * SPACING,
                elevation: elevation(r, c),
            });
            let here = (r * cols + c) as i64;
            if c + 1 < cols {
                raw.ways.push(two_way(here, here + 1));
            }
            if r + 1 < rows {
                raw.ways.push(two_way(here, here + cols as i64));
            }
        }
    }
    raw
}

/// West(0) - centre(1) - east(4) with north(2) and south(3) arms;
/// elevations `[2, -1, -1, -1, 2]`
pub fn plus_network() -> RawNetwork {
    let node = |id, lat, lng, elevation| RawNode {
        id,
        lat,
        lng,
        elevation: Some(elevation),
    };
    RawNetwork {
        nodes: vec![
            node(0, 45.0, 1.0 - SPACING, 2.0),
            node(1, 45.0, 1.0, -1.0),
            node(2, 45.0 + SPACING, 1.0, -1.0),
            node(3, 45.0 - SPACING, 1.0, -1.0),
            node(4, 45.0, 1.0 + SPACING, 2.0),
        ],
        ways: vec![two_way(0, 1), two_way(1, 2), two_way(1, 3), two_way(1, 4)],
        edges: vec![],
    }
}

pub fn service_for(source: Arc<MemorySource>) -> EvacuationService {
    service_with(source, Arc::new(NoElevation))
}

pub fn service_with(source: Arc<MemorySource>, elevation: Arc<dyn ElevationSource>) -> EvacuationService {
    let store = GraphStore::new(source, elevation, StoreOptions::default());
    EvacuationService::new(Arc::new(store))
}

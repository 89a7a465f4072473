//! Process-wide cache of road network graphs
//!
//! One immutable graph per `(place, network type)`, loaded on first use and
//! shared behind `Arc`. Concurrent first requests for the same key share a
//! single load; requests for other keys are never blocked by it.

use floodwise_common::{normalize_place, suggest_place, LatLng, NetworkType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::graph::RoadNetworkGraph;
use crate::provider::{ElevationSource, NetworkSource, ProviderError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Could not resolve place '{place}'{}", suggestion_hint(.suggestion))]
    UnresolvablePlace {
        place: String,
        suggestion: Option<String>,
    },

    #[error("Elevation data unavailable: {0}")]
    ElevationUnavailable(String),

    #[error("Road network provider failed: {0}")]
    Provider(String),
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Maximum number of cached graphs; 0 keeps everything
    pub max_places: usize,
    /// Drop everything outside the largest weakly connected component
    pub largest_component_only: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_places: 0,
            largest_component_only: true,
        }
    }
}

type CacheKey = (String, NetworkType);
type Slot = Arc<OnceCell<Arc<RoadNetworkGraph>>>;

#[derive(Default)]
struct Entries {
    slots: HashMap<CacheKey, Slot>,
    /// Loaded slots, oldest first; a key appears at most once
    loaded: VecDeque<(CacheKey, Slot)>,
}

pub struct GraphStore {
    network: Arc<dyn NetworkSource>,
    elevation: Arc<dyn ElevationSource>,
    options: StoreOptions,
    entries: Mutex<Entries>,
}

impl GraphStore {
    pub fn new(
        network: Arc<dyn NetworkSource>,
        elevation: Arc<dyn ElevationSource>,
        options: StoreOptions,
    ) -> Self {
        Self {
            network,
            elevation,
            options,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Graph for `place`, loading it on first use.
    ///
    /// Place names compare case-insensitively with whitespace collapsed. A
    /// failed load is not cached; the next call retries.
    pub async fn get(
        &self,
        place: &str,
        network_type: NetworkType,
    ) -> Result<Arc<RoadNetworkGraph>, StoreError> {
        let name = place.trim();
        let key = (normalize_place(name), network_type);
        if key.0.is_empty() {
            return Err(StoreError::UnresolvablePlace {
                place: place.to_string(),
                suggestion: None,
            });
        }

        let slot = {
            let mut entries = self.entries.lock();
            entries.slots.entry(key.clone()).or_default().clone()
        };

        if let Some(graph) = slot.get() {
            tracing::debug!(place = name, %network_type, "graph cache hit");
            return Ok(graph.clone());
        }

        let mut loaded_here = false;
        let flag = &mut loaded_here;
        let result = slot
            .get_or_try_init(|| async move {
                *flag = true;
                self.load(name, network_type).await.map(Arc::new)
            })
            .await
            .cloned();

        match &result {
            Ok(_) if loaded_here => self.record_loaded(key, &slot),
            Ok(_) => {}
            Err(_) => self.forget_failed(&key, &slot),
        }
        result
    }

    /// Load `place` ahead of the first request
    pub async fn preload(&self, place: &str, network_type: NetworkType) -> Result<(), StoreError> {
        self.get(place, network_type).await.map(|_| ())
    }

    /// Names of the cached graphs, sorted
    pub fn cached_places(&self) -> Vec<String> {
        let entries = self.entries.lock();
        let mut places: Vec<String> = entries
            .slots
            .values()
            .filter_map(|slot| slot.get().map(|g| g.place().to_string()))
            .collect();
        places.sort();
        places.dedup();
        places
    }

    pub fn len(&self) -> usize {
        self.entries.lock().loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_loaded(&self, key: CacheKey, slot: &Slot) {
        let mut entries = self.entries.lock();
        // a slot evicted or replaced while loading is not tracked
        let is_current = entries
            .slots
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, slot));
        if !is_current {
            return;
        }
        entries.loaded.retain(|(k, _)| *k != key);
        entries.loaded.push_back((key, slot.clone()));

        if self.options.max_places == 0 {
            return;
        }
        while entries.loaded.len() > self.options.max_places {
            let Some((oldest, oldest_slot)) = entries.loaded.pop_front() else {
                break;
            };
            if entries
                .slots
                .get(&oldest)
                .is_some_and(|current| Arc::ptr_eq(current, &oldest_slot))
            {
                entries.slots.remove(&oldest);
            }
            tracing::info!(place = %oldest.0, network_type = %oldest.1, "evicted cached graph");
        }
    }

    /// Drop the empty slot of a failed load unless other callers still wait on it.
    ///
    /// A waiter re-runs the load in the same cell, so removing the slot under
    /// it would let a later request start a second load for the same key.
    fn forget_failed(&self, key: &CacheKey, slot: &Slot) {
        let mut entries = self.entries.lock();
        // the map and this caller are the only holders
        let unshared_empty_slot = entries.slots.get(key).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.get().is_none() && Arc::strong_count(slot) == 2
        });
        if unshared_empty_slot {
            entries.slots.remove(key);
        }
    }

    async fn load(&self, place: &str, network_type: NetworkType) -> Result<RoadNetworkGraph, StoreError> {
        let started = Instant::now();
        tracing::info!(place, %network_type, "loading road network");

        let raw = self
            .network
            .fetch(place, network_type)
            .await
            .map_err(|e| match e {
                ProviderError::PlaceNotFound(_) => StoreError::UnresolvablePlace {
                    place: place.to_string(),
                    suggestion: self.suggest(place),
                },
                ProviderError::Elevation(msg) => StoreError::ElevationUnavailable(msg),
                other => StoreError::Provider(other.to_string()),
            })?;

        let mut parts = raw.into_parts(network_type, self.options.largest_component_only);
        if parts.nodes.is_empty() {
            return Err(StoreError::UnresolvablePlace {
                place: place.to_string(),
                suggestion: None,
            });
        }

        let missing: Vec<usize> = parts
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.elevation.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            let coords: Vec<LatLng> = missing.iter().map(|&i| parts.nodes[i].coord()).collect();
            let elevations = self
                .elevation
                .elevations(&coords)
                .await
                .map_err(|e| match e {
                    ProviderError::Elevation(msg) => StoreError::ElevationUnavailable(msg),
                    other => StoreError::ElevationUnavailable(other.to_string()),
                })?;
            if elevations.len() != coords.len() {
                return Err(StoreError::ElevationUnavailable(format!(
                    "expected {} elevations, got {}",
                    coords.len(),
                    elevations.len()
                )));
            }
            for (&i, elevation) in missing.iter().zip(elevations) {
                parts.nodes[i].elevation = elevation;
            }
        }

        let graph = RoadNetworkGraph::from_parts(place, network_type, parts.nodes, parts.edges)
            .map_err(|e| StoreError::Provider(e.to_string()))?;

        tracing::info!(
            place,
            %network_type,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "road network ready"
        );
        Ok(graph)
    }

    fn suggest(&self, place: &str) -> Option<String> {
        let known = self.cached_places();
        suggest_place(place, known.iter().map(String::as_str))
    }
}

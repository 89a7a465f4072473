//! Offline road networks saved with `floodwise-route fetch`

use floodwise_common::{place_slug, NetworkType};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};

use super::{NetworkSource, ProviderError, RawEdge, RawNetwork, RawNode};
use crate::graph::RoadNetworkGraph;

/// Network source reading serialized graphs from a directory.
///
/// `Saintes, Nouvelle-Aquitaine` with network type `walk` is looked up as
/// `saintes-nouvelle-aquitaine.walk.json`, then `saintes-nouvelle-aquitaine.json`.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path `fetch` writes to for this place and network type
    pub fn graph_path(&self, place: &str, network_type: NetworkType) -> PathBuf {
        self.dir
            .join(format!("{}.{}.json", place_slug(place), network_type.as_str()))
    }

    fn find(&self, place: &str, network_type: NetworkType) -> Option<PathBuf> {
        let slug = place_slug(place);
        if slug.is_empty() {
            return None;
        }
        [
            self.graph_path(place, network_type),
            self.dir.join(format!("{slug}.json")),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    async fn read(&self, place: &str, network_type: NetworkType) -> Result<RawNetwork, ProviderError> {
        let path = self
            .find(place, network_type)
            .ok_or_else(|| ProviderError::PlaceNotFound(place.to_string()))?;
        tracing::debug!(path = %path.display(), "reading saved road network");

        let graph = tokio::task::spawn_blocking(move || RoadNetworkGraph::load(path))
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .map_err(|e| ProviderError::InvalidResponse(format!("{e:#}")))?;

        Ok(RawNetwork {
            nodes: graph
                .nodes()
                .iter()
                .map(|n| RawNode {
                    id: n.id,
                    lat: n.lat,
                    lng: n.lng,
                    elevation: n.elevation,
                })
                .collect(),
            ways: Vec::new(),
            edges: graph
                .edges()
                .iter()
                .map(|e| RawEdge {
                    source: e.source,
                    target: e.target,
                    length_m: e.length_m,
                })
                .collect(),
        })
    }
}

impl NetworkSource for FileSource {
    fn fetch<'a>(
        &'a self,
        place: &'a str,
        network_type: NetworkType,
    ) -> BoxFuture<'a, Result<RawNetwork, ProviderError>> {
        self.read(place, network_type).boxed()
    }
}

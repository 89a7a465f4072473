//! Server configuration
//!
//! Loaded from an optional TOML file; every section and field has a default,
//! so an empty file (or none) gives a working setup against the public OSM and
//! OpenTopoData endpoints.

use anyhow::{Context, Result};
use floodwise_common::NetworkType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::boundary::{BoundaryExtractor, BoundaryOptions};
use crate::estimator::LinearEstimator;
use crate::provider::opentopodata::{DEFAULT_DATASET, DEFAULT_OPENTOPODATA_URL};
use crate::provider::overpass::{DEFAULT_NOMINATIM_URL, DEFAULT_OVERPASS_URL};
use crate::provider::{
    ElevationSource, FileSource, NetworkSource, NoElevation, OpenTopoDataSource, OverpassSource,
    RetryPolicy, SrtmSource,
};
use crate::route::{PathFinder, RouteOptions};
use crate::service::EvacuationService;
use crate::store::{GraphStore, StoreOptions};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: StoreOptions,
    pub network: NetworkConfig,
    pub elevation: ElevationConfig,
    pub routing: RouteOptions,
    pub boundary: BoundaryOptions,
    pub estimator: EstimatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// 0 disables the request timeout
    pub request_timeout_secs: u64,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
    /// Loaded at startup so the first request does not pay for it
    pub default_place: Option<String>,
    pub default_network_type: NetworkType,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 300,
            cors_origins: Vec::new(),
            default_place: None,
            default_network_type: NetworkType::Drive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSourceKind {
    #[default]
    Overpass,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub source: NetworkSourceKind,
    /// Directory of saved graphs for the `file` source
    pub data_dir: PathBuf,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub query_timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            source: NetworkSourceKind::default(),
            data_dir: PathBuf::from("data"),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            query_timeout_secs: 180,
            user_agent: format!("floodwise-route/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationSourceKind {
    #[default]
    Opentopodata,
    Srtm,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    pub source: ElevationSourceKind,
    pub url: String,
    pub dataset: String,
    pub batch_size: usize,
    /// Pause between two elevation batches
    pub pause_ms: u64,
    /// Directory of `.hgt` tiles for the `srtm` source
    pub srtm_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            source: ElevationSourceKind::default(),
            url: DEFAULT_OPENTOPODATA_URL.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            batch_size: 100,
            pause_ms: 1_000,
            srtm_dir: PathBuf::from("srtm"),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorConfig {
    /// Requests always use their `water_level` directly
    #[default]
    None,
    Linear(LinearEstimator),
}

impl Config {
    /// Read `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.network.user_agent)
            .timeout(Duration::from_secs(self.network.query_timeout_secs + 30))
            .build()
            .context("Failed to build HTTP client")
    }

    pub fn network_source(&self) -> Result<Arc<dyn NetworkSource>> {
        let source: Arc<dyn NetworkSource> = match self.network.source {
            NetworkSourceKind::Overpass => Arc::new(
                OverpassSource::new(self.http_client()?)
                    .with_endpoints(&self.network.nominatim_url, &self.network.overpass_url)
                    .with_query_timeout(Duration::from_secs(self.network.query_timeout_secs))
                    .with_retry(self.network.retry),
            ),
            NetworkSourceKind::File => Arc::new(FileSource::new(&self.network.data_dir)),
        };
        Ok(source)
    }

    pub fn elevation_source(&self) -> Result<Arc<dyn ElevationSource>> {
        let source: Arc<dyn ElevationSource> = match self.elevation.source {
            ElevationSourceKind::Opentopodata => Arc::new(
                OpenTopoDataSource::new(self.http_client()?)
                    .with_base_url(&self.elevation.url)
                    .with_dataset(&self.elevation.dataset)
                    .with_batch_size(self.elevation.batch_size)
                    .with_pause(Duration::from_millis(self.elevation.pause_ms))
                    .with_retry(self.elevation.retry),
            ),
            ElevationSourceKind::Srtm => Arc::new(
                SrtmSource::load_from_dir(&self.elevation.srtm_dir).with_context(|| {
                    format!("Failed to load SRTM tiles from {}", self.elevation.srtm_dir.display())
                })?,
            ),
            ElevationSourceKind::None => Arc::new(NoElevation),
        };
        Ok(source)
    }

    /// Wire the configured providers, cache and algorithms into a service
    pub fn build_service(&self) -> Result<EvacuationService> {
        let store = GraphStore::new(self.network_source()?, self.elevation_source()?, self.cache.clone());
        let service = EvacuationService::new(Arc::new(store))
            .with_path_finder(PathFinder::new(self.routing.clone()))
            .with_boundary_extractor(BoundaryExtractor::new(self.boundary.clone()));

        Ok(match &self.estimator {
            EstimatorConfig::None => service,
            EstimatorConfig::Linear(linear) => service.with_estimator(Arc::new(*linear)),
        })
    }
}

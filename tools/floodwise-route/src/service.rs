//! One evacuation request end to end
//!
//! Resolves the effective water level, fetches the cached graph, classifies
//! it once and runs routing and flood-zone extraction against that single
//! snapshot on a blocking worker.

use floodwise_common::{LatLng, NetworkType};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::boundary::{BoundaryError, BoundaryExtractor, FloodPolygon};
use crate::estimator::{EstimateError, SensorReadings, WaterLevelEstimator};
use crate::flood::FloodView;
use crate::route::{PathFinder, RouteError};
use crate::store::{GraphStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    UnresolvablePlace(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    NoRoute(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnresolvablePlace { .. } => ServiceError::UnresolvablePlace(err.to_string()),
            StoreError::ElevationUnavailable(_) | StoreError::Provider(_) => {
                ServiceError::Upstream(err.to_string())
            }
        }
    }
}

impl From<RouteError> for ServiceError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::Cancelled => ServiceError::Cancelled,
            RouteError::NoNearbyNode(_) | RouteError::NoRouteFound => ServiceError::NoRoute(err.to_string()),
        }
    }
}

impl From<BoundaryError> for ServiceError {
    fn from(err: BoundaryError) -> Self {
        match err {
            BoundaryError::Cancelled => ServiceError::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvacuationRequest {
    pub place: String,
    pub network_type: NetworkType,
    pub origin: LatLng,
    pub destination: LatLng,
    /// Water surface elevation in meters, used as-is unless an estimator applies
    pub water_level: f64,
    pub rain: Option<f64>,
    pub river_discharge: Option<f64>,
}

impl EvacuationRequest {
    pub fn new(place: impl Into<String>, origin: LatLng, destination: LatLng) -> Self {
        Self {
            place: place.into(),
            network_type: NetworkType::default(),
            origin,
            destination,
            water_level: 0.0,
            rain: None,
            river_discharge: None,
        }
    }

    fn validate(&self) -> Result<(), ServiceError> {
        self.origin
            .validate()
            .and_then(|_| self.destination.validate())
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        for (name, value) in [
            ("water_level", Some(self.water_level)),
            ("rain", self.rain),
            ("riverdischarge", self.river_discharge),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(ServiceError::InvalidRequest(format!(
                    "{name} must be a finite number"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvacuationPlan {
    pub path: Vec<LatLng>,
    pub flooded_zones: Vec<FloodPolygon>,
    /// Level the flood was simulated at
    pub water_level: f64,
    pub distance_m: f64,
}

pub struct EvacuationService {
    store: Arc<GraphStore>,
    estimator: Option<Arc<dyn WaterLevelEstimator>>,
    path_finder: PathFinder,
    boundary: BoundaryExtractor,
}

impl EvacuationService {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            estimator: None,
            path_finder: PathFinder::default(),
            boundary: BoundaryExtractor::default(),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn WaterLevelEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn with_path_finder(mut self, path_finder: PathFinder) -> Self {
        self.path_finder = path_finder;
        self
    }

    pub fn with_boundary_extractor(mut self, boundary: BoundaryExtractor) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Level to simulate for `request`.
    ///
    /// The estimator only runs when one is configured and the request carries
    /// rain or river discharge; the requested level is then fed to it as the
    /// gauge reading.
    pub fn effective_water_level(&self, request: &EvacuationRequest) -> Result<f64, ServiceError> {
        let Some(estimator) = &self.estimator else {
            return Ok(request.water_level);
        };
        if request.rain.is_none() && request.river_discharge.is_none() {
            return Ok(request.water_level);
        }

        let readings = SensorReadings {
            rainfall: request.rain.unwrap_or(0.0),
            river_discharge: request.river_discharge.unwrap_or(0.0),
            sensor_water_level: request.water_level,
        };
        estimator.estimate(&readings).map_err(|e| match e {
            EstimateError::InvalidReading { .. } => ServiceError::InvalidRequest(e.to_string()),
            EstimateError::NonFinite(_) => {
                tracing::error!(error = %e, "water level estimator failed");
                ServiceError::Internal(e.to_string())
            }
        })
    }

    #[tracing::instrument(skip_all, fields(place = %request.place, network_type = %request.network_type))]
    pub async fn evacuate(
        &self,
        request: &EvacuationRequest,
        cancel: &CancellationToken,
    ) -> Result<EvacuationPlan, ServiceError> {
        request.validate()?;
        let water_level = self.effective_water_level(request)?;

        let graph = self.store.get(&request.place, request.network_type).await?;
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let path_finder = self.path_finder.clone();
        let boundary = self.boundary.clone();
        let worker_cancel = cancel.clone();
        let (origin, destination) = (request.origin, request.destination);

        let (route, flooded_zones) = tokio::task::spawn_blocking(move || {
            let view = FloodView::classify(&graph, water_level)
                .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
            let route = path_finder.route(&view, origin, destination, &worker_cancel)?;
            let zones = boundary.extract(&view, &worker_cancel)?;
            Ok::<_, ServiceError>((route, zones))
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "evacuation worker failed");
            ServiceError::Internal(e.to_string())
        })??;

        tracing::info!(
            water_level,
            distance_m = route.distance_m,
            hops = route.coordinates.len(),
            flooded_zones = flooded_zones.len(),
            "evacuation plan ready"
        );

        Ok(EvacuationPlan {
            path: route.coordinates,
            flooded_zones,
            water_level,
            distance_m: route.distance_m,
        })
    }
}

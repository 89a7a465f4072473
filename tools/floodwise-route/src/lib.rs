//! Flood-aware evacuation routing
//!
//! Road networks are loaded once per place and kept immutable; every request
//! derives its own flood classification from them, routes over the dry part
//! and outlines the flooded areas.

pub mod boundary;
pub mod components;
pub mod config;
pub mod estimator;
pub mod flood;
pub mod geo;
pub mod graph;
pub mod provider;
pub mod route;
pub mod server;
pub mod service;
pub mod store;

#[cfg(test)]
mod testutil;

pub use boundary::{BoundaryExtractor, BoundaryOptions, FloodPolygon, HullMode};
pub use estimator::{LinearEstimator, SensorReadings, WaterLevelEstimator};
pub use flood::FloodView;
pub use graph::{Edge, Node, RoadNetworkGraph};
pub use route::{PathFinder, Route, RouteError, RouteOptions};
pub use service::{EvacuationPlan, EvacuationRequest, EvacuationService, ServiceError};
pub use store::{GraphStore, StoreError, StoreOptions};

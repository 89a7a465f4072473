mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{grid_network, plus_network, service_for, service_with, BrokenElevation, MemorySource};
use floodwise_route::server::{
    build_router, Coordinate, CoordinatesResponse, ErrorResponse, EvacuationResponse, HealthResponse,
    MessageResponse, ServerOptions,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn router() -> Router {
    let source = MemorySource::default()
        .with("Gridton", grid_network(3, 3, |r, c| Some(if (r, c) == (1, 1) { -1.0 } else { 3.0 })))
        .with("Plusville", plus_network());
    build_router(Arc::new(service_for(Arc::new(source))), &ServerOptions::default())
}

const GRIDTON_ROUTE: &str = "/evacuation-path?place=Gridton&origin_lat=45.0&origin_lng=1.0\
                             &destination_lat=45.0004&destination_lng=1.0004";

fn gridton() -> MemorySource {
    MemorySource::default().with("Gridton", grid_network(3, 3, |_, _| Some(3.0)))
}

fn router_with(source: MemorySource, request_timeout: Duration) -> Router {
    let options = ServerOptions {
        request_timeout,
        ..ServerOptions::default()
    };
    build_router(Arc::new(service_for(Arc::new(source))), &options)
}

async fn get<T: DeserializeOwned>(router: Router, uri: &str) -> (StatusCode, T) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("{uri}: {e}: {}", String::from_utf8_lossy(&bytes)));
    (status, body)
}

#[tokio::test]
async fn test_evacuation_path_ok() {
    let uri = "/evacuation-path?place=Gridton&origin_lat=45.0&origin_lng=1.0\
               &destination_lat=45.0004&destination_lng=1.0004&water_level=0";
    let (status, body): (_, EvacuationResponse) = get(router(), uri).await;

    assert_eq!(status, StatusCode::OK);
    // around the flooded centre: two steps along one side, two along the other
    assert_eq!(body.path.len(), 5);
    let near = |c: &Coordinate, lat: f64, lng: f64| (c.lat - lat).abs() < 1e-9 && (c.lng - lng).abs() < 1e-9;
    assert!(near(&body.path[0], 45.0, 1.0));
    assert!(near(&body.path[4], 45.0004, 1.0004));
    assert!(!body.path.iter().any(|c| near(c, 45.0002, 1.0002)));
    assert!(body.flooded_zones.is_empty());
    assert_eq!(body.water_level, 0.0);
    assert!(body.distance_m > 0.0);
}

#[tokio::test]
async fn test_no_route_is_not_found() {
    let uri = "/evacuation-path?place=Plusville&origin_lat=45.0&origin_lng=0.9998\
               &destination_lat=45.0&destination_lng=1.0002";
    let (status, body): (_, ErrorResponse) = get(router(), uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_bad_parameters_are_rejected() {
    let base = "/evacuation-path?place=Gridton&origin_lat=45.0&origin_lng=1.0&destination_lat=45.0004";

    let (status, body): (_, ErrorResponse) =
        get(router(), &format!("{base}&destination_lng=1.0004&network_type=boat")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.error.contains("boat"));

    let (status, _): (_, ErrorResponse) = get(router(), base).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _): (_, ErrorResponse) =
        get(router(), &format!("{base}&destination_lng=1.0004&water_level=deep")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _): (_, ErrorResponse) =
        get(router(), "/evacuation-path?place=Gridton&origin_lat=95&origin_lng=1&destination_lat=45&destination_lng=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_place_is_bad_request() {
    let uri = "/evacuation-path?place=Gridtown&origin_lat=45.0&origin_lng=1.0\
               &destination_lat=45.0004&destination_lng=1.0004";
    let (status, body): (_, ErrorResponse) = get(router(), uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.error.contains("Gridtown"));
}

#[tokio::test]
async fn test_secondary_endpoints() {
    let (status, body): (_, CoordinatesResponse) = get(router(), "/coordinates").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.path.len(), 4);
    assert_eq!((body.path[0].lat, body.path[0].lng), (48.8566, 2.3522));

    let (status, body): (_, MessageResponse) = get(router(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.message.contains("evacuation"));
}

#[tokio::test]
async fn test_health_lists_loaded_places() {
    let app = router();
    let (status, health): (_, HealthResponse) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "ok");
    assert!(health.cached_places.is_empty());

    let uri = "/evacuation-path?place=Gridton&origin_lat=45.0&origin_lng=1.0\
               &destination_lat=45.0004&destination_lng=1.0004";
    let (status, _): (_, EvacuationResponse) = get(app.clone(), uri).await;
    assert_eq!(status, StatusCode::OK);

    let (_, health): (_, HealthResponse) = get(app, "/health").await;
    assert_eq!(health.cached_places.len(), 1);
}

#[tokio::test]
async fn test_openapi_document() {
    let (status, doc): (_, serde_json::Value) = get(router(), "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/evacuation-path"]["get"].is_object());
}

#[tokio::test]
async fn test_slow_request_times_out() {
    let app = router_with(gridton().with_delay(Duration::from_millis(500)), Duration::from_millis(50));
    let (status, body): (_, ErrorResponse) = get(app, GRIDTON_ROUTE).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body.error, "Request exceeded 50ms");
}

#[tokio::test]
async fn test_zero_timeout_waits_for_the_plan() {
    let app = router_with(gridton().with_delay(Duration::from_millis(30)), Duration::ZERO);
    let (status, body): (_, EvacuationResponse) = get(app, GRIDTON_ROUTE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.path.len(), 5);
}

#[tokio::test]
async fn test_elevation_outage_is_bad_gateway() {
    let source = MemorySource::default().with("Gridton", grid_network(3, 3, |_, _| None));
    let service = service_with(Arc::new(source), Arc::new(BrokenElevation));
    let app = build_router(Arc::new(service), &ServerOptions::default());

    let (status, body): (_, ErrorResponse) = get(app, GRIDTON_ROUTE).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.error.contains("rate limit exceeded"), "{}", body.error);
}

#[tokio::test]
async fn test_network_outage_is_bad_gateway() {
    let app = router_with(gridton().offline(), Duration::from_secs(5));
    let (status, body): (_, ErrorResponse) = get(app, GRIDTON_ROUTE).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.error.contains("connection refused"), "{}", body.error);
}

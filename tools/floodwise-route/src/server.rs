use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use floodwise_common::{LatLng, NetworkType};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::boundary::FloodPolygon;
use crate::service::{EvacuationPlan, EvacuationRequest, EvacuationService, ServiceError};

/// Fixed route for front-end smoke tests
const DEMO_PATH: [(f64, f64); 4] = [
    (48.8566, 2.3522),
    (48.8575, 2.3555),
    (48.8580, 2.3610),
    (48.8605, 2.3650),
];

#[derive(OpenApi)]
#[openapi(
    paths(evacuation_path, coordinates, root, health),
    components(schemas(
        Coordinate,
        EvacuationResponse,
        CoordinatesResponse,
        MessageResponse,
        HealthResponse,
        ErrorResponse
    )),
    info(
        title = "Floodwise Route API",
        version = "0.3.0",
        description = "Evacuation routes that avoid flooded roads"
    )
)]
struct ApiDoc;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Upper bound for one evacuation request, answered with 408 when hit;
    /// zero disables it
    pub request_timeout: Duration,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(300),
            cors_origins: Vec::new(),
        }
    }
}

struct AppState {
    service: Arc<EvacuationService>,
    request_timeout: Duration,
}

/// Build the Axum router
pub fn build_router(service: Arc<EvacuationService>, options: &ServerOptions) -> Router {
    let cors = if options.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(AnyOrigin).allow_methods(AnyOrigin).allow_headers(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = options
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(AnyOrigin).allow_headers(AnyOrigin)
    };

    let state = Arc::new(AppState {
        service,
        request_timeout: options.request_timeout,
    });

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/evacuation-path", get(evacuation_path))
        .route("/coordinates", get(coordinates))
        .route("/health", get(health))
        .route("/", get(root))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    tracing::info!("API docs available at http://{addr}/swagger-ui");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
        })
        .await?;
    Ok(())
}

// ============ Evacuation Endpoint ============

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EvacuationQuery {
    /// Place name, e.g. "Saintes, Nouvelle-Aquitaine"
    place: String,
    origin_lat: f64,
    origin_lng: f64,
    destination_lat: f64,
    destination_lng: f64,
    /// drive, walk, bike, all, all_private or none (default drive)
    network_type: Option<String>,
    /// Water surface elevation in meters (default 0)
    water_level: Option<f64>,
    /// River discharge fed to the water level estimator
    riverdischarge: Option<f64>,
    /// Rainfall fed to the water level estimator
    rain: Option<f64>,
}

impl EvacuationQuery {
    fn into_request(self) -> Result<EvacuationRequest, ServiceError> {
        let network_type = match self.network_type.as_deref() {
            None | Some("") => NetworkType::default(),
            Some(raw) => raw
                .parse::<NetworkType>()
                .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?,
        };
        Ok(EvacuationRequest {
            place: self.place,
            network_type,
            origin: LatLng::new(self.origin_lat, self.origin_lng),
            destination: LatLng::new(self.destination_lat, self.destination_lng),
            water_level: self.water_level.unwrap_or(0.0),
            rain: self.rain,
            river_discharge: self.riverdischarge,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    #[schema(example = 45.7464)]
    pub lat: f64,
    #[schema(example = -0.6333)]
    pub lng: f64,
}

impl From<LatLng> for Coordinate {
    fn from(c: LatLng) -> Self {
        Self { lat: c.lat, lng: c.lng }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EvacuationResponse {
    /// Route from origin to destination over dry roads
    pub path: Vec<Coordinate>,
    /// Convex polygons around flooded areas, rings not closed
    pub flooded_zones: Vec<Vec<Coordinate>>,
    /// Water level the flood was simulated at
    #[schema(example = 2.5)]
    pub water_level: f64,
    /// Route length in meters
    #[schema(example = 1840.2)]
    pub distance_m: f64,
}

impl From<EvacuationPlan> for EvacuationResponse {
    fn from(plan: EvacuationPlan) -> Self {
        let polygon = |p: FloodPolygon| p.vertices.into_iter().map(Coordinate::from).collect();
        Self {
            path: plan.path.into_iter().map(Coordinate::from).collect(),
            flooded_zones: plan.flooded_zones.into_iter().map(polygon).collect(),
            water_level: plan.water_level,
            distance_m: plan.distance_m,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// JSON error with an explicit status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidRequest(_) | ServiceError::UnresolvablePlace(_) => StatusCode::BAD_REQUEST,
            ServiceError::NoRoute(_) => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("Internal error: {detail}")).into_response()
}

/// Shortest route avoiding flooded roads, plus the flooded areas
#[utoipa::path(
    get,
    path = "/evacuation-path",
    params(EvacuationQuery),
    responses(
        (status = 200, description = "Route found", body = EvacuationResponse),
        (status = 400, description = "Invalid parameters or unknown place", body = ErrorResponse),
        (status = 404, description = "No dry route between origin and destination", body = ErrorResponse),
        (status = 408, description = "Request took too long", body = ErrorResponse),
        (status = 502, description = "Map or elevation provider failed", body = ErrorResponse),
        (status = 503, description = "Request cancelled", body = ErrorResponse)
    ),
    tag = "evacuation"
)]
async fn evacuation_path(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EvacuationQuery>, QueryRejection>,
) -> Result<Json<EvacuationResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let request = query.into_request()?;
    tracing::info!(
        place = %request.place,
        origin = ?request.origin,
        destination = ?request.destination,
        water_level = request.water_level,
        "evacuation request"
    );

    // cancels the search when the client goes away and this future is dropped
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let evacuation = state.service.evacuate(&request, &cancel);
    let result = if state.request_timeout.is_zero() {
        evacuation.await
    } else {
        match tokio::time::timeout(state.request_timeout, evacuation).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                return Err(ApiError::new(
                    StatusCode::REQUEST_TIMEOUT,
                    format!("Request exceeded {:?}", state.request_timeout),
                ));
            }
        }
    };
    guard.disarm();

    Ok(Json(result?.into()))
}

// ============ Secondary Endpoints ============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CoordinatesResponse {
    pub path: Vec<Coordinate>,
}

/// Fixed coordinate sequence for front-end smoke tests
#[utoipa::path(
    get,
    path = "/coordinates",
    responses((status = 200, description = "Demo path", body = CoordinatesResponse)),
    tag = "misc"
)]
async fn coordinates() -> Json<CoordinatesResponse> {
    Json(CoordinatesResponse {
        path: DEMO_PATH
            .iter()
            .map(|&(lat, lng)| Coordinate { lat, lng })
            .collect(),
    })
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome message", body = MessageResponse)),
    tag = "misc"
)]
async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the flood evacuation API!".to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Places whose road network is loaded
    pub cached_places: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "misc"
)]
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        cached_places: state.service.store().cached_places(),
    })
}

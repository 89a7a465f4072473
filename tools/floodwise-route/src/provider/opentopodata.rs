//! Elevations from an OpenTopoData-compatible HTTP API
//!
//! Coordinates are sent in batches as `lat,lng|lat,lng|...`; the public
//! instance allows 100 locations per call and one call per second.

use floodwise_common::LatLng;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::time::Duration;

use super::{http_status_error, retry_on_network_error, ElevationSource, ProviderError, RetryPolicy};

pub const DEFAULT_OPENTOPODATA_URL: &str = "https://api.opentopodata.org";
pub const DEFAULT_DATASET: &str = "aster30m";
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    status: String,
    #[serde(default)]
    results: Vec<ElevationResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElevationResult {
    elevation: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OpenTopoDataSource {
    client: reqwest::Client,
    base_url: String,
    dataset: String,
    batch_size: usize,
    pause: Duration,
    retry: RetryPolicy,
}

impl OpenTopoDataSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_OPENTOPODATA_URL.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            batch_size: MAX_BATCH_SIZE,
            pause: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = dataset.into();
        self
    }

    /// Locations per request, capped at the API limit
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Delay between two consecutive batches
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_batch(&self, batch: &[LatLng]) -> Result<Vec<Option<f64>>, ProviderError> {
        let endpoint = format!("{}/v1/{}", self.base_url, self.dataset);
        let url = endpoint.as_str();
        let locations = batch
            .iter()
            .map(|c| format!("{},{}", c.lat, c.lng))
            .collect::<Vec<_>>()
            .join("|");
        let locations = locations.as_str();

        let body: ElevationResponse = retry_on_network_error(self.retry, "elevation lookup", || async move {
            let response = self
                .client
                .get(url)
                .query(&[("locations", locations)])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(http_status_error(url, response.status()));
            }
            Ok(response.json().await?)
        })
        .await
        .map_err(|e| ProviderError::Elevation(e.to_string()))?;

        if body.status != "OK" {
            return Err(ProviderError::Elevation(format!(
                "status {}: {}",
                body.status,
                body.error.unwrap_or_default()
            )));
        }
        if body.results.len() != batch.len() {
            return Err(ProviderError::Elevation(format!(
                "expected {} results, got {}",
                batch.len(),
                body.results.len()
            )));
        }
        Ok(body.results.into_iter().map(|r| r.elevation).collect())
    }

    async fn lookup(&self, coords: &[LatLng]) -> Result<Vec<Option<f64>>, ProviderError> {
        let mut elevations = Vec::with_capacity(coords.len());
        for (i, batch) in coords.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            elevations.extend(self.fetch_batch(batch).await?);
        }

        let missing = elevations.iter().filter(|e| e.is_none()).count();
        tracing::info!(
            dataset = %self.dataset,
            locations = coords.len(),
            missing,
            "fetched elevations"
        );
        Ok(elevations)
    }
}

impl ElevationSource for OpenTopoDataSource {
    fn elevations<'a>(
        &'a self,
        coords: &'a [LatLng],
    ) -> BoxFuture<'a, Result<Vec<Option<f64>>, ProviderError>> {
        self.lookup(coords).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> OpenTopoDataSource {
        OpenTopoDataSource::new(reqwest::Client::new())
            .with_base_url(server.uri())
            .with_batch_size(2)
            .with_pause(Duration::ZERO)
            .with_retry(RetryPolicy::none())
    }

    fn ok(elevations: &[Option<f64>]) -> ResponseTemplate {
        let results: Vec<_> = elevations.iter().map(|e| json!({"elevation": e})).collect();
        ResponseTemplate::new(200).set_body_json(json!({"status": "OK", "results": results}))
    }

    #[tokio::test]
    async fn test_batches_preserve_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/aster30m"))
            .and(query_param("locations", "45,1|45.1,1"))
            .respond_with(ok(&[Some(12.5), None]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/aster30m"))
            .and(query_param("locations", "45.2,1"))
            .respond_with(ok(&[Some(-1.0)]))
            .expect(1)
            .mount(&server)
            .await;

        let coords = [LatLng::new(45.0, 1.0), LatLng::new(45.1, 1.0), LatLng::new(45.2, 1.0)];
        let elevations = source(&server).elevations(&coords).await.unwrap();
        assert_eq!(elevations, vec![Some(12.5), None, Some(-1.0)]);
    }

    #[tokio::test]
    async fn test_error_status_is_elevation_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/aster30m"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "INVALID_REQUEST",
                "error": "Too many locations"
            })))
            .mount(&server)
            .await;

        let err = source(&server)
            .elevations(&[LatLng::new(45.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Elevation(msg) if msg.contains("Too many locations")));
    }

    #[tokio::test]
    async fn test_http_failure_is_elevation_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = source(&server)
            .elevations(&[LatLng::new(45.0, 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Elevation(_)));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ok(&[])).expect(0).mount(&server).await;
        assert!(source(&server).elevations(&[]).await.unwrap().is_empty());
    }
}

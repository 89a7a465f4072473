//! OpenStreetMap road networks from Nominatim + Overpass
//!
//! Nominatim resolves the place name to an OSM relation or way (used as an
//! Overpass search area) or, failing that, to a bounding box. Overpass then
//! returns every `highway` way in that area matching the network type filter,
//! together with its nodes.

use floodwise_common::NetworkType;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{
    http_status_error, retry_on_network_error, NetworkSource, Oneway, ProviderError, RawNetwork,
    RawNode, RawWay, RetryPolicy,
};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Overpass area ids are OSM ids shifted into a per-type range
const RELATION_AREA_OFFSET: i64 = 3_600_000_000;
const WAY_AREA_OFFSET: i64 = 2_400_000_000;

const ACCESS_PUBLIC: &str = r#"["access"!~"private"]"#;

/// Overpass QL tag filter for the ways of a network type
pub fn way_filter(network_type: NetworkType) -> String {
    let filter = match network_type {
        NetworkType::Drive => concat!(
            r#"["area"!~"yes"]["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track"]"#,
            r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
            r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
        ),
        NetworkType::Walk => concat!(
            r#"["area"!~"yes"]["highway"!~"abandoned|bus_guideway|construction|cycleway|motor|no|planned|platform|proposed|raceway|razed"]"#,
            r#"["foot"!~"no"]["service"!~"private"]"#,
        ),
        NetworkType::Bike => concat!(
            r#"["area"!~"yes"]["highway"!~"abandoned|bus_guideway|construction|corridor|elevator|escalator|footway|motor|no|planned|platform|proposed|raceway|razed|steps"]"#,
            r#"["bicycle"!~"no"]["service"!~"private"]"#,
        ),
        NetworkType::All => concat!(
            r#"["area"!~"yes"]["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#,
            r#"["service"!~"private"]"#,
        ),
        NetworkType::AllPrivate => {
            r#"["area"!~"yes"]["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#
        }
        NetworkType::None => "",
    };

    match network_type {
        NetworkType::AllPrivate | NetworkType::None => filter.to_string(),
        _ => format!("{filter}{ACCESS_PUBLIC}"),
    }
}

/// Where Overpass should look
#[derive(Debug, Clone, PartialEq)]
pub enum SearchArea {
    Area(i64),
    /// south, west, north, east
    BoundingBox([f64; 4]),
}

/// Overpass QL for all matching `highway` ways in `area`, with their nodes
pub fn build_query(area: &SearchArea, network_type: NetworkType, timeout_secs: u64) -> String {
    let filter = way_filter(network_type);
    match area {
        SearchArea::Area(id) => format!(
            "[out:json][timeout:{timeout_secs}];area({id})->.searchArea;(way[\"highway\"]{filter}(area.searchArea););(._;>;);out;"
        ),
        SearchArea::BoundingBox([south, west, north, east]) => format!(
            "[out:json][timeout:{timeout_secs}];(way[\"highway\"]{filter}({south},{west},{north},{east}););(._;>;);out;"
        ),
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    osm_type: Option<String>,
    osm_id: Option<i64>,
    /// south, north, west, east as strings
    boundingbox: Option<[String; 4]>,
}

impl NominatimPlace {
    fn search_area(&self) -> Option<SearchArea> {
        match (self.osm_type.as_deref(), self.osm_id) {
            (Some("relation"), Some(id)) => return Some(SearchArea::Area(RELATION_AREA_OFFSET + id)),
            (Some("way"), Some(id)) => return Some(SearchArea::Area(WAY_AREA_OFFSET + id)),
            _ => {}
        }
        let bbox = self.boundingbox.as_ref()?;
        let parse = |s: &String| s.parse::<f64>().ok();
        let (south, north, west, east) = (parse(&bbox[0])?, parse(&bbox[1])?, parse(&bbox[2])?, parse(&bbox[3])?);
        Some(SearchArea::BoundingBox([south, west, north, east]))
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
    },
    Way {
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

fn into_raw_network(response: OverpassResponse) -> RawNetwork {
    let mut raw = RawNetwork::default();
    for element in response.elements {
        match element {
            Element::Node { id, lat, lon } => raw.nodes.push(RawNode {
                id,
                lat,
                lng: lon,
                elevation: None,
            }),
            Element::Way { nodes, tags } if nodes.len() >= 2 => {
                let oneway = Oneway::from_tags(
                    tags.get("oneway").map(String::as_str),
                    tags.get("junction").map(String::as_str),
                );
                raw.ways.push(RawWay { nodes, oneway });
            }
            _ => {}
        }
    }
    raw
}

/// Network source backed by the public OSM APIs
#[derive(Debug, Clone)]
pub struct OverpassSource {
    client: reqwest::Client,
    nominatim_url: String,
    overpass_url: String,
    query_timeout_secs: u64,
    retry: RetryPolicy,
}

impl OverpassSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            query_timeout_secs: 180,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoints(mut self, nominatim_url: impl Into<String>, overpass_url: impl Into<String>) -> Self {
        self.nominatim_url = nominatim_url.into().trim_end_matches('/').to_string();
        self.overpass_url = overpass_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Resolve `place` to an Overpass search area
    pub async fn geocode(&self, place: &str) -> Result<SearchArea, ProviderError> {
        let search_url = format!("{}/search", self.nominatim_url);
        let url = search_url.as_str();
        let places: Vec<NominatimPlace> = retry_on_network_error(self.retry, "geocoding", || async move {
            let response = self
                .client
                .get(url)
                .query(&[("q", place), ("format", "jsonv2"), ("limit", "1")])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(http_status_error(url, response.status()));
            }
            Ok(response.json().await?)
        })
        .await?;

        places
            .first()
            .and_then(NominatimPlace::search_area)
            .ok_or_else(|| ProviderError::PlaceNotFound(place.to_string()))
    }

    async fn query(&self, query: &str) -> Result<OverpassResponse, ProviderError> {
        retry_on_network_error(self.retry, "overpass query", || async move {
            let response = self
                .client
                .post(&self.overpass_url)
                .form(&[("data", query)])
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(http_status_error(&self.overpass_url, response.status()));
            }
            Ok(response.json().await?)
        })
        .await
    }

    async fn fetch_network(&self, place: &str, network_type: NetworkType) -> Result<RawNetwork, ProviderError> {
        let area = self.geocode(place).await?;
        tracing::debug!(place, ?area, %network_type, "resolved place");

        let query = build_query(&area, network_type, self.query_timeout_secs);
        let raw = into_raw_network(self.query(&query).await?);
        if raw.ways.is_empty() {
            return Err(ProviderError::PlaceNotFound(format!(
                "{place} (no {network_type} roads found)"
            )));
        }

        tracing::info!(
            place,
            nodes = raw.nodes.len(),
            ways = raw.ways.len(),
            "downloaded road network"
        );
        Ok(raw)
    }
}

impl NetworkSource for OverpassSource {
    fn fetch<'a>(
        &'a self,
        place: &'a str,
        network_type: NetworkType,
    ) -> BoxFuture<'a, Result<RawNetwork, ProviderError>> {
        self.fetch_network(place, network_type).boxed()
    }
}

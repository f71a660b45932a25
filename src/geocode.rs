//! Forward geocoding: turn a free-text place name into coordinates.
//! Uses Nominatim (OpenStreetMap) search, taking the best match.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::{Error, Result};

/// A latitude/longitude pair rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build rounded coordinates, rejecting NaN and infinities.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(Error::Geocoding(format!(
                "non-finite coordinates ({}, {})",
                latitude, longitude
            )));
        }
        Ok(Self {
            latitude: round2(latitude),
            longitude: round2(longitude),
        })
    }
}

/// Round to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Resolves a location query to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, query: &str) -> Result<Coordinates>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Nominatim search client.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    http: Client,
    base_url: String,
}

impl NominatimClient {
    pub fn new<S: Into<String>>(base_url: S, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.geocoder_base_url.clone(),
            &config.geocoder_user_agent,
            config.http_timeout,
        )
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn locate(&self, query: &str) -> Result<Coordinates> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("empty location query".to_string()));
        }

        debug!(query, "Geocoding location");

        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::Geocoding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Geocoding(format!("geocoder returned status {}", status)));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| Error::Geocoding(format!("invalid response: {}", e)))?;

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| Error::LocationNotFound(query.to_string()))?;

        let latitude: f64 = place
            .lat
            .parse()
            .map_err(|_| Error::Geocoding(format!("invalid latitude {:?}", place.lat)))?;
        let longitude: f64 = place
            .lon
            .parse()
            .map_err(|_| Error::Geocoding(format!("invalid longitude {:?}", place.lon)))?;

        let coords = Coordinates::new(latitude, longitude)?;
        info!(
            query,
            latitude = coords.latitude,
            longitude = coords.longitude,
            place = place.display_name.as_deref().unwrap_or(""),
            "Coordinates found for location"
        );
        Ok(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> NominatimClient {
        NominatimClient::new(server.base_url(), "jester-tests", Duration::from_secs(5))
            .expect("client")
    }

    fn decimals(value: f64) -> usize {
        let text = format!("{}", value);
        text.split('.').nth(1).map_or(0, str::len)
    }

    #[test]
    fn coordinates_are_rounded_to_two_places() {
        let coords = Coordinates::new(51.5073219, -0.1276474).unwrap();
        assert_eq!(coords.latitude, 51.51);
        assert_eq!(coords.longitude, -0.13);
        assert!(decimals(coords.latitude) <= 2);
        assert!(decimals(coords.longitude) <= 2);
    }

    #[test]
    fn coordinates_reject_non_finite_values() {
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
        assert!(Coordinates::new(0.0, f64::INFINITY).is_err());
    }

    #[tokio::test]
    async fn locate_returns_rounded_first_match() {
        let server = MockServer::start_async().await;

        let search_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/search")
                .query_param("q", "London")
                .query_param("format", "json")
                .header("user-agent", "jester-tests");
            then.status(200).json_body(json!([
                { "lat": "51.5073219", "lon": "-0.1276474", "display_name": "London, Greater London, England" },
                { "lat": "42.9836747", "lon": "-81.2496068", "display_name": "London, Ontario, Canada" }
            ]));
        });

        let coords = client(&server).locate("London").await.unwrap();

        assert_eq!(coords, Coordinates { latitude: 51.51, longitude: -0.13 });
        assert!(coords.latitude.is_finite() && coords.longitude.is_finite());
        search_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn locate_reports_location_not_found_on_empty_result() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200).json_body(json!([]));
        });

        let err = client(&server).locate("Xyzzyville").await.unwrap_err();

        assert!(matches!(err, Error::LocationNotFound(ref q) if q == "Xyzzyville"));
        assert!(err.is_resolution_failure());
    }

    #[tokio::test]
    async fn locate_maps_server_errors_to_geocoding_failure() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(503).body("busy");
        });

        let err = client(&server).locate("Paris").await.unwrap_err();

        assert!(matches!(err, Error::Geocoding(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn locate_rejects_unparseable_coordinates() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200)
                .json_body(json!([{ "lat": "north-ish", "lon": "0.0" }]));
        });

        let err = client(&server).locate("Somewhere").await.unwrap_err();
        assert!(matches!(err, Error::Geocoding(_)));
    }

    #[tokio::test]
    async fn locate_rejects_blank_query_without_calling_provider() {
        let server = MockServer::start_async().await;

        let search_mock = server.mock(|when, then| {
            when.method(GET).path("/search");
            then.status(200).json_body(json!([]));
        });

        let err = client(&server).locate("   ").await.unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        search_mock.assert_calls(0);
    }
}

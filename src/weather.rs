//! OpenWeatherMap forecast client.
//!
//! Only the description of the most imminent forecast slot is used; the rest
//! of the payload is ignored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::geocode::Coordinates;
use crate::{Error, Result};

/// Fetches a short weather description for a pair of coordinates.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn describe(&self, at: Coordinates) -> Result<String>;
}

/// Subset of the `/forecast` response we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastPayload {
    #[serde(default)]
    pub list: Vec<ForecastEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastEntry {
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

impl ForecastPayload {
    /// Description of the first condition of the first forecast entry.
    pub fn first_description(&self) -> Result<&str> {
        let entry = self
            .list
            .first()
            .ok_or_else(|| Error::ForecastUnavailable("forecast list is empty".to_string()))?;
        let condition = entry.weather.first().ok_or_else(|| {
            Error::ForecastUnavailable("first forecast entry has no weather".to_string())
        })?;
        Ok(condition.description.as_str())
    }
}

/// OpenWeatherMap client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new<S: Into<String>>(api_key: S, base_url: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::MissingCredential(
                crate::config::WEATHER_TOKEN_ENV.to_string(),
            ));
        }

        let http = Client::builder()
            .user_agent(crate::config::DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidArgument(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.require_weather_api_key()?,
            &config.weather_base_url,
            config.http_timeout,
        )
    }

    /// Raw forecast payload for the given coordinates.
    pub async fn forecast(&self, at: Coordinates) -> Result<ForecastPayload> {
        let response = self
            .http
            .get(format!("{}/forecast", self.base_url))
            .query(&[
                ("lat", at.latitude.to_string()),
                ("lon", at.longitude.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| Error::ForecastUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ForecastUnavailable(format!(
                "weather provider returned status {}",
                status
            )));
        }

        response
            .json::<ForecastPayload>()
            .await
            .map_err(|e| Error::ForecastUnavailable(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherClient {
    async fn describe(&self, at: Coordinates) -> Result<String> {
        let payload = self.forecast(at).await?;
        let description = payload.first_description()?.to_string();
        debug!(
            latitude = at.latitude,
            longitude = at.longitude,
            %description,
            "Forecast fetched"
        );
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const LONDON: Coordinates = Coordinates {
        latitude: 51.51,
        longitude: -0.13,
    };

    fn client(server: &MockServer) -> OpenWeatherClient {
        OpenWeatherClient::new("owm_key", &server.base_url(), Duration::from_secs(5))
            .expect("client")
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = OpenWeatherClient::new(" ", "http://localhost", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::MissingCredential(_)));
    }

    #[test]
    fn first_description_picks_first_entry_first_condition() {
        let payload: ForecastPayload = serde_json::from_value(json!({
            "cod": "200",
            "list": [
                { "dt": 1, "weather": [
                    { "main": "Rain", "description": "light rain" },
                    { "main": "Mist", "description": "mist" }
                ]},
                { "dt": 2, "weather": [{ "description": "clear sky" }] }
            ]
        }))
        .unwrap();

        assert_eq!(payload.first_description().unwrap(), "light rain");
    }

    #[test]
    fn first_description_fails_on_empty_list() {
        let payload: ForecastPayload = serde_json::from_value(json!({ "list": [] })).unwrap();
        let err = payload.first_description().unwrap_err();
        assert!(err.is_fetch_failure());
    }

    #[test]
    fn first_description_fails_on_missing_weather() {
        let payload: ForecastPayload =
            serde_json::from_value(json!({ "list": [{ "dt": 1 }] })).unwrap();
        let err = payload.first_description().unwrap_err();
        assert!(matches!(err, Error::ForecastUnavailable(_)));
    }

    #[tokio::test]
    async fn describe_sends_coordinates_and_key() {
        let server = MockServer::start_async().await;

        let forecast_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/forecast")
                .query_param("lat", "51.51")
                .query_param("lon", "-0.13")
                .query_param("appid", "owm_key");
            then.status(200).json_body(json!({
                "list": [{ "weather": [{ "description": "light rain" }] }]
            }));
        });

        let description = client(&server).describe(LONDON).await.unwrap();

        assert_eq!(description, "light rain");
        forecast_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn describe_reports_empty_forecast_as_unavailable() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/forecast");
            then.status(200).json_body(json!({ "cod": "200", "list": [] }));
        });

        let err = client(&server).describe(LONDON).await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(!err.is_resolution_failure());
    }

    #[tokio::test]
    async fn describe_reports_non_success_status() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/forecast");
            then.status(401).json_body(json!({ "cod": 401, "message": "Invalid API key" }));
        });

        let err = client(&server).describe(LONDON).await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn describe_reports_malformed_body() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/forecast");
            then.status(200).body("<html>oops</html>");
        });

        let err = client(&server).describe(LONDON).await.unwrap_err();
        assert!(matches!(err, Error::ForecastUnavailable(ref m) if m.contains("invalid response")));
    }
}

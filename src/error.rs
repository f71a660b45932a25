//! Error types for the weather bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Forecast unavailable: {0}")]
    ForecastUnavailable(String),

    #[error("LLM API error {status}: {body}")]
    LlmStatus { status: u16, body: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Geocoder found nothing or could not be queried.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Error::LocationNotFound(_) | Error::Geocoding(_))
    }

    /// Weather provider failed or returned an unusable payload.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Error::ForecastUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<teloxide::RequestError> for Error {
    fn from(err: teloxide::RequestError) -> Self {
        Error::Telegram(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_location_not_found() {
        let err = Error::LocationNotFound("Atlantis".to_string());
        assert!(err.to_string().contains("Location not found"));
        assert!(err.to_string().contains("Atlantis"));
    }

    #[test]
    fn test_error_display_forecast_unavailable() {
        let err = Error::ForecastUnavailable("empty forecast list".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Forecast unavailable"));
        assert!(msg.contains("empty forecast list"));
    }

    #[test]
    fn test_error_display_llm_status() {
        let err = Error::LlmStatus {
            status: 503,
            body: "overloaded".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn test_error_display_missing_credential() {
        let err = Error::MissingCredential("WEATHER_TOKEN".to_string());
        assert!(err.to_string().contains("Missing credential"));
        assert!(err.to_string().contains("WEATHER_TOKEN"));
    }

    #[test]
    fn resolution_and_fetch_failures_are_distinct() {
        let not_found = Error::LocationNotFound("x".into());
        let geocoding = Error::Geocoding("timeout".into());
        let forecast = Error::ForecastUnavailable("500".into());

        assert!(not_found.is_resolution_failure());
        assert!(geocoding.is_resolution_failure());
        assert!(!forecast.is_resolution_failure());

        assert!(forecast.is_fetch_failure());
        assert!(!not_found.is_fetch_failure());
        assert!(!geocoding.is_fetch_failure());
    }

    #[test]
    fn llm_errors_are_neither_resolution_nor_fetch() {
        let err = Error::Llm("bad json".into());
        assert!(!err.is_resolution_failure());
        assert!(!err.is_fetch_failure());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();

        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_debug_impl() {
        let err = Error::Telegram("flood wait".into());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Telegram"));
    }
}

//! Weather Jester Library
//!
//! This library provides tools to:
//! - Resolve free-text locations to coordinates (Nominatim)
//! - Fetch the upcoming forecast description (OpenWeatherMap)
//! - Pick a keyword-driven quip or ask an LLM to add humor (OpenRouter)
//! - Route Telegram conversations, including the "enter a location" prompt
//! - Expose Prometheus metrics for each conversation flow

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geocode;
pub mod humor;
pub mod integrations;
pub mod metrics;
pub mod telegram;
pub mod weather;

// Re-export common types
pub use config::Config;
pub use dispatcher::{Dispatcher, Handled, Incoming, Outbox, Outgoing, Route, WeatherReport};
pub use error::{Error, Result};
pub use geocode::{Coordinates, Geocoder, NominatimClient};
pub use humor::{HumorPool, Humorist};
pub use integrations::OpenRouterClient;
pub use metrics::FlowOutcome;
pub use weather::{ForecastProvider, OpenWeatherClient};

//! Configuration for the bot and its providers
//!
//! Loads configuration from config.yml file, with `.env` and environment
//! variables filling in (and overriding) credentials.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

/// Default constants (used when a setting is absent)
pub const CONFIG_FILE: &str = "config.yml";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_LLM_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-3.5-turbo";
pub const DEFAULT_USER_AGENT: &str = "weather_jester/0.1.0";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PENDING_TTL_SECS: u64 = 600;

/// Environment keys for the three secrets.
pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
pub const WEATHER_TOKEN_ENV: &str = "WEATHER_TOKEN";
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramSection>,
    weather: Option<WeatherSection>,
    geocoder: Option<GeocoderSection>,
    llm: Option<LlmSection>,
    http: Option<HttpSection>,
    conversation: Option<ConversationSection>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramSection {
    bot_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherSection {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocoderSection {
    base_url: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmSection {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSection {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    timeout_secs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationSection {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pending_ttl_secs: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub weather_api_key: String,
    pub weather_base_url: String,
    pub geocoder_base_url: String,
    pub geocoder_user_agent: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub http_timeout: Duration,
    pub pending_ttl: Duration,
}

impl Config {
    /// Load from an explicit path when given, otherwise search the defaults.
    /// Environment variables take precedence over config.yml values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::discover(Path::new(".")),
        }
    }

    /// Try `config.yml` in `dir`, then in its parent, then the environment.
    /// Only a missing file moves on to the next candidate.
    fn discover(dir: &Path) -> Result<Self> {
        for candidate in [dir.join(CONFIG_FILE), dir.join("..").join(CONFIG_FILE)] {
            match fs::read_to_string(&candidate) {
                Ok(content) => return Self::parse(&content, &candidate),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        debug!("No {} found, using environment only", CONFIG_FILE);
        Ok(Self::from_env())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(ref v) = value {
            if let Some(var_name) = placeholder(v) {
                if let Ok(env_val) = std::env::var(var_name) {
                    return env_val;
                }
            }
        }
        // Also check explicit env_key as fallback
        if let Ok(env_val) = std::env::var(env_key) {
            return env_val;
        }
        match value {
            Some(v) if placeholder(&v).is_some() => String::new(),
            Some(v) => v,
            None => String::new(),
        }
    }

    /// Resolve a plain setting that has a built-in default.
    fn resolve_setting(value: Option<String>, default: &str) -> String {
        match value {
            Some(v) => match placeholder(&v) {
                Some(var_name) => std::env::var(var_name).unwrap_or_else(|_| default.to_string()),
                None => v,
            },
            None => default.to_string(),
        }
    }

    /// Resolve a seconds value from string config or env var
    fn resolve_env_secs(value: Option<String>, env_key: &str, default: u64) -> u64 {
        if let Some(ref v) = value {
            if let Some(var_name) = placeholder(v) {
                if let Ok(env_val) = std::env::var(var_name) {
                    if let Ok(parsed) = env_val.parse::<u64>() {
                        return parsed;
                    }
                }
            }
            // Try parsing directly if it's a number
            if let Ok(parsed) = v.parse::<u64>() {
                return parsed;
            }
        }
        // Fallback: check explicit env_key
        if let Ok(env_val) = std::env::var(env_key) {
            if let Ok(parsed) = env_val.parse::<u64>() {
                return parsed;
            }
        }
        default
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        Self::load_dotenv();

        let yaml: YamlConfig = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))?;
        Ok(Self::from_yaml(yaml))
    }

    /// Build configuration from environment variables only
    pub fn from_env() -> Self {
        Self::load_dotenv();
        Self::from_yaml(YamlConfig::default())
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let telegram = yaml.telegram.unwrap_or_default();
        let weather = yaml.weather.unwrap_or_default();
        let geocoder = yaml.geocoder.unwrap_or_default();
        let llm = yaml.llm.unwrap_or_default();
        let http = yaml.http.unwrap_or_default();
        let conversation = yaml.conversation.unwrap_or_default();

        Self {
            bot_token: Self::resolve_env_string(telegram.bot_token, BOT_TOKEN_ENV),
            weather_api_key: Self::resolve_env_string(weather.api_key, WEATHER_TOKEN_ENV),
            weather_base_url: Self::resolve_setting(weather.base_url, DEFAULT_WEATHER_URL),
            geocoder_base_url: Self::resolve_setting(geocoder.base_url, DEFAULT_GEOCODER_URL),
            geocoder_user_agent: Self::resolve_setting(geocoder.user_agent, DEFAULT_USER_AGENT),
            llm_api_key: Self::resolve_env_string(llm.api_key, OPENROUTER_API_KEY_ENV),
            llm_base_url: Self::resolve_setting(llm.base_url, DEFAULT_LLM_URL),
            llm_model: Self::resolve_setting(llm.model, DEFAULT_LLM_MODEL),
            http_timeout: Duration::from_secs(Self::resolve_env_secs(
                http.timeout_secs,
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            pending_ttl: Duration::from_secs(Self::resolve_env_secs(
                conversation.pending_ttl_secs,
                "PENDING_TTL_SECS",
                DEFAULT_PENDING_TTL_SECS,
            )),
        }
    }

    /// Telegram bot token, required for polling
    pub fn require_bot_token(&self) -> Result<&str> {
        require(&self.bot_token, BOT_TOKEN_ENV)
    }

    /// OpenWeatherMap API key
    pub fn require_weather_api_key(&self) -> Result<&str> {
        require(&self.weather_api_key, WEATHER_TOKEN_ENV)
    }

    /// OpenRouter API key
    pub fn require_llm_api_key(&self) -> Result<&str> {
        require(&self.llm_api_key, OPENROUTER_API_KEY_ENV)
    }
}

/// Extract `VAR` from a `${VAR}` placeholder.
fn placeholder(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
}

fn require<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        Err(Error::MissingCredential(name.to_string()))
    } else {
        Ok(value)
    }
}

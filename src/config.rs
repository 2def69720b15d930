use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Credentials and transport settings for the Anthropic provider.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_anthropic_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub stream: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_anthropic_endpoint(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
            stream: false,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("stream", &self.stream)
            .finish()
    }
}

fn default_anthropic_endpoint() -> String {
    DEFAULT_ANTHROPIC_ENDPOINT.into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_model_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherConfig {
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
            timeout_secs: default_weather_timeout(),
        }
    }
}

fn default_geocoding_url() -> String {
    DEFAULT_GEOCODING_URL.into()
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.into()
}

fn default_weather_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|err| AgentError::Config(format!("failed to parse configuration: {err}")))
    }

    pub fn from_env_or_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut cfg = Self::from_file(path)?;
        cfg.apply_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    /// Defaults with environment overrides applied; used when no file is given.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_overrides(|key| env::var(key).ok());
        cfg
    }

    /// Applies overrides read through `lookup`. Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(key);
        }
        if let Some(key) = lookup("TRAVEL_AGENT_API_KEY") {
            self.anthropic.api_key = Some(key);
        }
        if let Some(base) = lookup("ANTHROPIC_BASE_URL") {
            self.anthropic.endpoint = format!("{}/messages", base.trim_end_matches('/'));
        }
        if let Some(endpoint) = lookup("TRAVEL_AGENT_ENDPOINT") {
            self.anthropic.endpoint = endpoint;
        }
        if let Some(stream) = lookup("TRAVEL_AGENT_STREAMING") {
            if let Ok(parsed) = stream.parse::<bool>() {
                self.anthropic.stream = parsed;
            }
        }
        if let Some(max_tokens) = lookup("TRAVEL_AGENT_MAX_TOKENS") {
            if let Ok(parsed) = max_tokens.parse::<u32>() {
                self.anthropic.max_tokens = parsed.max(1);
            }
        }
        if let Some(timeout) = lookup("TRAVEL_AGENT_WEATHER_TIMEOUT") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.weather.timeout_secs = parsed;
            }
        }
        if let Some(filter) = lookup("TRAVEL_AGENT_LOG") {
            self.logging.filter = filter;
        }
        if let Some(json) = lookup("TRAVEL_AGENT_LOG_JSON") {
            if let Ok(parsed) = json.parse::<bool>() {
                self.logging.json = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml("").unwrap();

        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.anthropic.endpoint, DEFAULT_ANTHROPIC_ENDPOINT);
        assert_eq!(cfg.anthropic.max_tokens, 4096);
        assert_eq!(cfg.weather.forecast_url, DEFAULT_FORECAST_URL);
        assert_eq!(cfg.logging.filter, "info");
    }

    #[test]
    fn loads_sections_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[anthropic]\napi_key='sk-file'\nmax_tokens=1024\nstream=true\n[weather]\ntimeout_secs=5\n[logging]\nfilter='debug'\njson=true"
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).unwrap();

        assert_eq!(cfg.anthropic.api_key.as_deref(), Some("sk-file"));
        assert_eq!(cfg.anthropic.max_tokens, 1024);
        assert!(cfg.anthropic.stream);
        assert_eq!(cfg.anthropic.endpoint, DEFAULT_ANTHROPIC_ENDPOINT);
        assert_eq!(cfg.weather.timeout_secs, 5);
        assert_eq!(cfg.weather.geocoding_url, DEFAULT_GEOCODING_URL);
        assert_eq!(cfg.logging.filter, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = AppConfig::from_toml("[anthropic\nmax_tokens=").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AgentError::Io(_)));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = AppConfig::from_toml("[anthropic]\napi_key='sk-file'").unwrap();
        cfg.apply_overrides(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-env"),
            ("ANTHROPIC_BASE_URL", "http://localhost:9000/v1/"),
            ("TRAVEL_AGENT_STREAMING", "true"),
            ("TRAVEL_AGENT_LOG", "travel_agent=trace"),
        ]));

        assert_eq!(cfg.anthropic.api_key.as_deref(), Some("sk-env"));
        assert_eq!(cfg.anthropic.endpoint, "http://localhost:9000/v1/messages");
        assert!(cfg.anthropic.stream);
        assert_eq!(cfg.logging.filter, "travel_agent=trace");
    }

    #[test]
    fn crate_specific_variables_win() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-generic"),
            ("TRAVEL_AGENT_API_KEY", "sk-specific"),
            ("ANTHROPIC_BASE_URL", "http://proxy/v1"),
            ("TRAVEL_AGENT_ENDPOINT", "http://direct/messages"),
        ]));

        assert_eq!(cfg.anthropic.api_key.as_deref(), Some("sk-specific"));
        assert_eq!(cfg.anthropic.endpoint, "http://direct/messages");
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let cfg = ProviderConfig {
            api_key: Some("sk-ant-secret".into()),
            ..ProviderConfig::default()
        };

        let printed = format!("{cfg:?}");
        assert!(!printed.contains("sk-ant-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains(DEFAULT_ANTHROPIC_ENDPOINT));

        let app = format!("{:?}", AppConfig { anthropic: cfg, ..AppConfig::default() });
        assert!(!app.contains("sk-ant-secret"));
    }

    #[test]
    fn unparseable_values_are_ignored() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(lookup(&[
            ("TRAVEL_AGENT_STREAMING", "sometimes"),
            ("TRAVEL_AGENT_MAX_TOKENS", "lots"),
            ("TRAVEL_AGENT_WEATHER_TIMEOUT", "-3"),
            ("TRAVEL_AGENT_LOG_JSON", "yes"),
        ]));

        assert_eq!(cfg, AppConfig::default());
    }
}

//! Current-weather lookup backed by the Open-Meteo geocoding and forecast APIs.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::WeatherConfig;
use crate::error::{AgentError, Result};
use crate::tool::Tool;

pub const WEATHER_TOOL_NAME: &str = "weatherTool";

const CURRENT_FIELDS: &str = "temperature_2m,apparent_temperature,relative_humidity_2m,wind_speed_10m,wind_gusts_10m,weather_code";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Location '{0}' not found")]
    LocationNotFound(String),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Current conditions at a resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
    pub conditions: String,
    pub location: String,
}

impl WeatherReport {
    fn from_current(location: String, current: CurrentWeather) -> Self {
        Self {
            temperature: current.temperature_2m,
            feels_like: current.apparent_temperature,
            humidity: current.relative_humidity_2m,
            wind_speed: current.wind_speed_10m,
            wind_gust: current.wind_gusts_10m,
            conditions: weather_condition(current.weather_code).to_string(),
            location,
        }
    }
}

/// Maps a WMO weather interpretation code to a description.
pub fn weather_condition(code: u16) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[derive(Debug, Deserialize)]
struct WeatherInput {
    location: String,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
    name: String,
}

impl GeocodingResponse {
    fn first_match(self, location: &str) -> std::result::Result<GeocodingResult, WeatherError> {
        self.results
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| WeatherError::LocationNotFound(location.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentWeather,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    wind_gusts_10m: f64,
    weather_code: u16,
}

/// The `weatherTool` the travel agent registers.
#[derive(Debug, Clone)]
pub struct WeatherTool {
    http: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherTool {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AgentError::ToolInvocation {
                name: WEATHER_TOOL_NAME.into(),
                source: Box::new(err),
            })?;
        Ok(Self { http, config })
    }

    /// Geocodes `location` and fetches its current conditions.
    pub async fn current_weather(
        &self,
        location: &str,
    ) -> std::result::Result<WeatherReport, WeatherError> {
        let place = self.geocode(location).await?;
        tracing::debug!(
            location,
            resolved = %place.name,
            latitude = place.latitude,
            longitude = place.longitude,
            "geocoded location"
        );

        let resp = self
            .http
            .get(&self.config.forecast_url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ])
            .send()
            .await?;
        let forecast: ForecastResponse = checked(resp, "forecast").await?.json().await?;

        Ok(WeatherReport::from_current(place.name, forecast.current))
    }

    async fn geocode(&self, location: &str) -> std::result::Result<GeocodingResult, WeatherError> {
        let resp = self
            .http
            .get(&self.config.geocoding_url)
            .query(&[("name", location), ("count", "1")])
            .send()
            .await?;
        let parsed: GeocodingResponse = checked(resp, "geocoding").await?.json().await?;
        parsed.first_match(location)
    }
}

async fn checked(
    resp: reqwest::Response,
    service: &'static str,
) -> std::result::Result<reqwest::Response, WeatherError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(WeatherError::Status {
        service,
        status,
        body,
    })
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        WEATHER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get current weather for a location"
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City name"}
            },
            "required": ["location"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let input: WeatherInput = serde_json::from_value(input)
            .map_err(|err| AgentError::Protocol(format!("invalid {WEATHER_TOOL_NAME} input: {err}")))?;
        let location = input.location.trim();
        if location.is_empty() {
            return Err(AgentError::Protocol(format!(
                "`location` must not be empty for {WEATHER_TOOL_NAME}"
            )));
        }

        let report = self
            .current_weather(location)
            .await
            .map_err(|err| AgentError::ToolInvocation {
                name: WEATHER_TOOL_NAME.into(),
                source: Box::new(err),
            })?;
        tracing::info!(
            location = %report.location,
            conditions = %report.conditions,
            temperature = report.temperature,
            "fetched current weather"
        );
        Ok(serde_json::to_value(report)?)
    }
}

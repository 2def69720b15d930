//! Tools the travel agent can register.

pub mod weather;

pub use weather::{weather_condition, WeatherError, WeatherReport, WeatherTool, WEATHER_TOOL_NAME};

// src/ingest/providers/openweather.rs
//! OpenWeather ambient snapshot for the dashboard header: temperature, wind,
//! humidity, UV index and moon phase at the Athens centroid. Independent of
//! the incident pipeline; polled on its own schedule into the weather cache.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::region::{ATHENS_LAT, ATHENS_LNG};

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub description: Option<String>,
    pub uvi: Option<f64>,
    /// km/h (OpenWeather reports m/s).
    pub wind_speed: Option<f64>,
    pub wind_deg: Option<f64>,
    pub humidity: Option<f64>,
    pub moon_phase: Option<f64>,
    pub moon_symbol: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    weather: Vec<WeatherDescription>,
    #[serde(default)]
    main: MainReadings,
    #[serde(default)]
    wind: Wind,
}

#[derive(Debug, Deserialize)]
struct WeatherDescription {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MainReadings {
    #[serde(default)]
    temp: Option<f64>,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OneCall {
    #[serde(default)]
    current: OneCallCurrent,
    #[serde(default)]
    daily: Vec<OneCallDaily>,
}

#[derive(Debug, Default, Deserialize)]
struct OneCallCurrent {
    #[serde(default)]
    uvi: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OneCallDaily {
    #[serde(default)]
    moon_phase: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct UviReading {
    #[serde(default)]
    value: Option<f64>,
}

fn mps_to_kmh(speed: Option<f64>) -> Option<f64> {
    speed
        .filter(|v| v.is_finite())
        .map(|v| (v * 3.6 * 10.0).round() / 10.0)
}

pub fn moon_symbol(phase: Option<f64>) -> &'static str {
    let Some(phase) = phase.filter(|p| p.is_finite()) else {
        return "—";
    };
    if !(0.0625..0.9375).contains(&phase) {
        "🌑"
    } else if phase < 0.1875 {
        "🌒"
    } else if phase < 0.3125 {
        "🌓"
    } else if phase < 0.4375 {
        "🌔"
    } else if phase < 0.5625 {
        "🌕"
    } else if phase < 0.6875 {
        "🌖"
    } else if phase < 0.8125 {
        "🌗"
    } else {
        "🌘"
    }
}

fn build_snapshot(weather: CurrentWeather, onecall: OneCall, uvi: UviReading) -> WeatherSnapshot {
    let moon_phase = onecall.daily.first().and_then(|day| day.moon_phase);
    WeatherSnapshot {
        temp: weather.main.temp,
        feels_like: weather.main.feels_like,
        description: weather
            .weather
            .first()
            .and_then(|entry| entry.description.clone()),
        uvi: uvi.value.or(onecall.current.uvi),
        wind_speed: mps_to_kmh(weather.wind.speed),
        wind_deg: weather.wind.deg,
        humidity: weather.main.humidity,
        moon_phase,
        moon_symbol: moon_symbol(moon_phase).to_string(),
        updated_at: Utc::now(),
    }
}

/// Fetch the ambient snapshot. The current-weather call is required; the UV
/// and one-call lookups are best-effort extras.
pub async fn fetch_snapshot(client: &reqwest::Client, api_key: &str) -> Result<WeatherSnapshot> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(anyhow!("OPENWEATHER_API_KEY is required for the weather poller"));
    }

    let shared = [
        ("lat", ATHENS_LAT.to_string()),
        ("lon", ATHENS_LNG.to_string()),
        ("appid", api_key.to_string()),
        ("units", "metric".to_string()),
    ];

    let weather_req = client
        .get(format!("{OPENWEATHER_BASE_URL}/weather"))
        .query(&shared)
        .send();
    let uvi_req = client
        .get(format!("{OPENWEATHER_BASE_URL}/uvi"))
        .query(&shared)
        .send();
    let onecall_req = client
        .get(format!("{OPENWEATHER_BASE_URL}/onecall"))
        .query(&shared)
        .query(&[("exclude", "minutely,hourly")])
        .send();

    let (weather_res, uvi_res, onecall_res) =
        futures::future::join3(weather_req, uvi_req, onecall_req).await;

    let weather: CurrentWeather = weather_res
        .context("openweather request")?
        .error_for_status()
        .context("openweather status")?
        .json()
        .await
        .context("openweather body")?;

    let uvi: UviReading = match uvi_res {
        Ok(response) => response.json().await.unwrap_or_default(),
        Err(_) => UviReading::default(),
    };
    let onecall: OneCall = match onecall_res {
        Ok(response) => response.json().await.unwrap_or_default(),
        Err(_) => OneCall::default(),
    };

    Ok(build_snapshot(weather, onecall, uvi))
}

/// Fixture variant for tests: raw JSON bodies instead of live calls.
pub fn snapshot_from_fixtures(weather: &str, onecall: &str, uvi: &str) -> Result<WeatherSnapshot> {
    let weather: CurrentWeather =
        serde_json::from_str(weather).context("parsing openweather fixture")?;
    let onecall: OneCall = serde_json::from_str(onecall).unwrap_or_default();
    let uvi: UviReading = serde_json::from_str(uvi).unwrap_or_default();
    Ok(build_snapshot(weather, onecall, uvi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_maps_units_and_moon() {
        let weather = serde_json::json!({
            "weather": [{ "description": "clear sky" }],
            "main": { "temp": 28.4, "feels_like": 29.1, "humidity": 40.0 },
            "wind": { "speed": 5.0, "deg": 180.0 }
        })
        .to_string();
        let onecall = serde_json::json!({
            "current": { "uvi": 6.0 },
            "daily": [{ "moon_phase": 0.5 }]
        })
        .to_string();

        let snapshot = snapshot_from_fixtures(&weather, &onecall, "{}").expect("fixture");
        assert_eq!(snapshot.temp, Some(28.4));
        assert_eq!(snapshot.wind_speed, Some(18.0)); // 5 m/s → 18 km/h
        assert_eq!(snapshot.uvi, Some(6.0)); // one-call fallback
        assert_eq!(snapshot.moon_symbol, "🌕");
    }

    #[test]
    fn direct_uvi_reading_wins() {
        let weather = r#"{ "main": { "temp": 20.0 } }"#;
        let uvi = r#"{ "value": 3.2 }"#;
        let onecall = r#"{ "current": { "uvi": 9.9 } }"#;
        let snapshot = snapshot_from_fixtures(weather, onecall, uvi).expect("fixture");
        assert_eq!(snapshot.uvi, Some(3.2));
    }

    #[test]
    fn moon_symbol_edges() {
        assert_eq!(moon_symbol(Some(0.0)), "🌑");
        assert_eq!(moon_symbol(Some(0.95)), "🌑");
        assert_eq!(moon_symbol(Some(0.25)), "🌓");
        assert_eq!(moon_symbol(None), "—");
    }
}

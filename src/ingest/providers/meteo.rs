// src/ingest/providers/meteo.rs
//! Open-Meteo forecast adapter: polls a handful of fixed Attica locations
//! and emits weather-alert incidents when wind, precipitation probability or
//! severe weather codes cross thresholds. When nothing is alarming it emits
//! a single calm-conditions snapshot so the dashboard still shows coverage.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::classify::{Category, Severity};
use crate::ingest::types::{RawCandidate, SourceId, SourceProvider};

const OPEN_METEO_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";

pub struct MeteoLocation {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

pub static METEO_LOCATIONS: &[MeteoLocation] = &[
    MeteoLocation { name: "Athens Center", lat: 37.9838, lng: 23.7275 },
    MeteoLocation { name: "Piraeus", lat: 37.9439, lng: 23.6467 },
    MeteoLocation { name: "Kifissia", lat: 38.0741, lng: 23.8116 },
    MeteoLocation { name: "Glyfada", lat: 37.8629, lng: 23.7488 },
    MeteoLocation { name: "Penteli", lat: 38.0614, lng: 23.8694 },
];

/// WMO codes we treat as severe weather.
const SEVERE_CODES: &[i64] = &[95, 96, 99, 65, 67, 75, 82, 86];

fn weather_label(code: Option<i64>) -> &'static str {
    match code {
        Some(95) => "Thunderstorm",
        Some(96) => "Thunderstorm with hail",
        Some(99) => "Severe thunderstorm with hail",
        Some(65) => "Heavy rain",
        Some(67) => "Freezing rain",
        Some(75) => "Heavy snow",
        Some(82) => "Violent rain showers",
        Some(86) => "Heavy snow showers",
        _ => "Weather risk",
    }
}

#[derive(Debug, Default, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    hourly: Hourly,
    #[serde(default)]
    current: Current,
}

#[derive(Debug, Default, Deserialize)]
struct Hourly {
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Current {
    #[serde(default)]
    weather_code: Option<i64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
}

struct LocationSnapshot {
    location: &'static MeteoLocation,
    url: String,
    current_wind: f64,
    max_wind: f64,
    max_precip_prob: f64,
    current_code: Option<i64>,
    is_alert: bool,
}

fn max_numeric(values: &[Option<f64>]) -> f64 {
    values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max)
}

fn snapshot_severity(snapshot: &LocationSnapshot) -> Severity {
    let severe_now = matches!(snapshot.current_code, Some(95 | 96 | 99));
    if snapshot.max_wind >= 60.0 || severe_now || snapshot.max_precip_prob >= 90.0 {
        Severity::High
    } else if snapshot.max_wind >= 40.0 || snapshot.max_precip_prob >= 70.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn alert_title(snapshot: &LocationSnapshot, severity: Severity) -> String {
    let name = snapshot.location.name;
    if severity == Severity::High {
        format!(
            "Meteo Alert: {} risk in {name}",
            weather_label(snapshot.current_code)
        )
    } else if snapshot.max_wind >= 40.0 {
        format!("Meteo Alert: Strong winds expected in {name}")
    } else {
        format!("Meteo Alert: Rain risk in {name}")
    }
}

fn candidate_from_snapshot(snapshot: &LocationSnapshot, calm_fallback: bool) -> RawCandidate {
    let severity = if calm_fallback {
        Severity::Low
    } else {
        snapshot_severity(snapshot)
    };
    let title = if calm_fallback {
        format!(
            "Meteo Snapshot: Calm conditions in {}",
            snapshot.location.name
        )
    } else {
        alert_title(snapshot, severity)
    };
    let description = if calm_fallback {
        format!(
            "Current wind {:.0} km/h, rain probability up to {:.0}%",
            snapshot.current_wind, snapshot.max_precip_prob
        )
    } else {
        format!(
            "Forecast max wind {:.0} km/h, rain probability up to {:.0}%",
            snapshot.max_wind, snapshot.max_precip_prob
        )
    };

    let mut raw = RawCandidate::new(SourceId::Meteo, title);
    raw.description = Some(description);
    raw.url = Some(snapshot.url.clone());
    raw.domain = Some("open-meteo.com".to_string());
    raw.lat = Some(snapshot.location.lat);
    raw.lng = Some(snapshot.location.lng);
    raw.published_at = Utc::now();
    raw.severity = Some(severity);
    raw.category = Some(Category::WeatherAlert);
    raw.query_hint = Some(snapshot.location.name.to_string());
    raw
}

enum Mode {
    Http { client: reqwest::Client },
    /// One pre-fetched body per location, in `METEO_LOCATIONS` order.
    Fixture(Vec<String>),
}

pub struct MeteoProvider {
    mode: Mode,
}

impl MeteoProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixtures(bodies: Vec<String>) -> Self {
        Self {
            mode: Mode::Fixture(bodies),
        }
    }

    fn snapshot_from_response(
        location: &'static MeteoLocation,
        url: String,
        response: ForecastResponse,
    ) -> LocationSnapshot {
        let max_wind = max_numeric(&response.hourly.wind_speed_10m);
        let max_precip_prob = max_numeric(&response.hourly.precipitation_probability);
        let severe_forecast = response
            .hourly
            .weather_code
            .iter()
            .flatten()
            .any(|code| SEVERE_CODES.contains(code));

        LocationSnapshot {
            location,
            url,
            current_wind: response.current.wind_speed_10m.unwrap_or(0.0),
            max_wind,
            max_precip_prob,
            current_code: response.current.weather_code,
            is_alert: max_wind >= 40.0 || max_precip_prob >= 70.0 || severe_forecast,
        }
    }

    async fn fetch_location(
        client: &reqwest::Client,
        location: &'static MeteoLocation,
    ) -> Result<LocationSnapshot> {
        let params = [
            ("latitude", location.lat.to_string()),
            ("longitude", location.lng.to_string()),
            ("current", "weather_code,wind_speed_10m".to_string()),
            (
                "hourly",
                "precipitation_probability,wind_speed_10m,weather_code".to_string(),
            ),
            ("forecast_days", "1".to_string()),
            ("timezone", "auto".to_string()),
        ];
        let request = client.get(OPEN_METEO_ENDPOINT).query(&params).build()?;
        let url = request.url().to_string();
        let response: ForecastResponse = client
            .execute(request)
            .await
            .with_context(|| format!("open-meteo request ({})", location.name))?
            .error_for_status()
            .context("open-meteo status")?
            .json()
            .await
            .context("open-meteo body")?;
        Ok(Self::snapshot_from_response(location, url, response))
    }

    fn candidates_from_snapshots(snapshots: Vec<LocationSnapshot>) -> Vec<RawCandidate> {
        let alerts: Vec<RawCandidate> = snapshots
            .iter()
            .filter(|snapshot| snapshot.is_alert)
            .map(|snapshot| candidate_from_snapshot(snapshot, false))
            .collect();

        if !alerts.is_empty() {
            return alerts;
        }
        match snapshots.first() {
            Some(first) => vec![candidate_from_snapshot(first, true)],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl SourceProvider for MeteoProvider {
    async fn fetch_latest(&self, _window_minutes: i64, _limit: usize) -> Result<Vec<RawCandidate>> {
        match &self.mode {
            Mode::Fixture(bodies) => {
                let mut snapshots = Vec::new();
                for (location, body) in METEO_LOCATIONS.iter().zip(bodies) {
                    let response: ForecastResponse =
                        serde_json::from_str(body).context("parsing open-meteo fixture")?;
                    snapshots.push(Self::snapshot_from_response(
                        location,
                        OPEN_METEO_ENDPOINT.to_string(),
                        response,
                    ));
                }
                Ok(Self::candidates_from_snapshots(snapshots))
            }
            Mode::Http { client } => {
                let fetches = METEO_LOCATIONS
                    .iter()
                    .map(|location| Self::fetch_location(client, location));
                let results = futures::future::join_all(fetches).await;

                // Individual locations may fail without sinking the provider;
                // only a full wipe-out is an error.
                let mut snapshots = Vec::new();
                let mut last_error = None;
                for result in results {
                    match result {
                        Ok(snapshot) => snapshots.push(snapshot),
                        Err(err) => {
                            tracing::debug!(error = %err, "open-meteo location failed");
                            last_error = Some(err);
                        }
                    }
                }
                if snapshots.is_empty() {
                    return Err(last_error
                        .unwrap_or_else(|| anyhow!("open-meteo returned no locations")));
                }
                Ok(Self::candidates_from_snapshots(snapshots))
            }
        }
    }

    fn id(&self) -> SourceId {
        SourceId::Meteo
    }
}

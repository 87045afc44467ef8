// src/ingest/providers/usgs.rs
//! USGS FDSN earthquake feed for the wider Greece box. Structured and
//! authoritative: bypasses the inclusion filter, and its coordinates are
//! accepted even outside the Attica bbox (offshore epicentres matter).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::classify::{Category, Severity};
use crate::ingest::types::{RawCandidate, SourceId, SourceProvider};

const USGS_ENDPOINT: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(default)]
    mag: Option<f64>,
    #[serde(default)]
    place: Option<String>,
    /// Event time in epoch milliseconds.
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// GeoJSON order: [lng, lat, depth].
    #[serde(default)]
    coordinates: Vec<f64>,
}

fn magnitude_severity(magnitude: Option<f64>) -> Severity {
    match magnitude {
        Some(mag) if mag >= 4.0 => Severity::High,
        Some(mag) if mag >= 3.0 => Severity::Medium,
        _ => Severity::Low,
    }
}

fn magnitude_label(magnitude: Option<f64>) -> String {
    match magnitude {
        Some(mag) if mag.is_finite() => format!("{mag:.1}"),
        _ => "N/A".to_string(),
    }
}

fn parse_event_time(millis: Option<i64>) -> DateTime<Utc> {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}

fn normalize_feature(feature: Feature) -> Option<RawCandidate> {
    let coordinates = feature.geometry?.coordinates;
    let lng = *coordinates.first()?;
    let lat = *coordinates.get(1)?;
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }

    let place = feature
        .properties
        .place
        .unwrap_or_else(|| "Ελλάδα".to_string());
    let magnitude = feature.properties.mag;

    let mut raw = RawCandidate::new(
        SourceId::Usgs,
        format!("Σεισμός Μ{} — {place}", magnitude_label(magnitude)),
    );
    raw.description = Some(format!("USGS seismic event near {place}"));
    raw.url = feature.properties.url.filter(|u| !u.trim().is_empty());
    raw.domain = Some("earthquake.usgs.gov".to_string());
    raw.lat = Some(lat);
    raw.lng = Some(lng);
    raw.published_at = parse_event_time(feature.properties.time);
    raw.severity = Some(magnitude_severity(magnitude));
    raw.category = Some(Category::Accident);
    raw.query_hint = Some(place);
    Some(raw)
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture(String),
}

pub struct UsgsProvider {
    mode: Mode,
}

impl UsgsProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn parse_body(body: &str) -> Result<Vec<RawCandidate>> {
        let collection: FeatureCollection =
            serde_json::from_str(body).context("parsing usgs geojson")?;
        Ok(collection
            .features
            .into_iter()
            .filter_map(normalize_feature)
            .collect())
    }
}

#[async_trait]
impl SourceProvider for UsgsProvider {
    async fn fetch_latest(&self, _window_minutes: i64, _limit: usize) -> Result<Vec<RawCandidate>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body),
            Mode::Http { client } => {
                let body = client
                    .get(USGS_ENDPOINT)
                    .query(&[
                        ("format", "geojson"),
                        ("minmagnitude", "2.0"),
                        ("minlatitude", "36.0"),
                        ("maxlatitude", "42.0"),
                        ("minlongitude", "19.0"),
                        ("maxlongitude", "29.0"),
                    ])
                    .send()
                    .await
                    .context("usgs request")?
                    .error_for_status()
                    .context("usgs status")?
                    .text()
                    .await
                    .context("usgs body")?;
                Self::parse_body(&body)
            }
        }
    }

    fn id(&self) -> SourceId {
        SourceId::Usgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        serde_json::json!({
            "features": [
                {
                    "properties": {
                        "mag": 4.2,
                        "place": "12 km SW of Aegina, Greece",
                        "time": 1710497700000_i64,
                        "url": "https://earthquake.usgs.gov/earthquakes/eventpage/abc"
                    },
                    "geometry": { "coordinates": [23.40, 37.70, 10.0] }
                },
                {
                    "properties": { "mag": 2.1, "place": "Crete, Greece" },
                    "geometry": { "coordinates": [25.1, 35.3, 8.0] }
                },
                { "properties": { "mag": 3.0 } }
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn features_map_to_candidates_with_severity_tiers() {
        let provider = UsgsProvider::from_fixture(&fixture());
        let items = provider.fetch_latest(1440, 120).await.expect("parse");
        // The geometry-less feature is skipped.
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].severity, Some(Severity::High));
        assert_eq!(items[0].category, Some(Category::Accident));
        assert!(items[0].title.starts_with("Σεισμός Μ4.2"));
        assert_eq!(items[0].lat, Some(37.70));
        assert_eq!(items[0].lng, Some(23.40));

        assert_eq!(items[1].severity, Some(Severity::Low));
    }

    #[test]
    fn magnitude_tiers() {
        assert_eq!(magnitude_severity(Some(2.5)), Severity::Low);
        assert_eq!(magnitude_severity(Some(3.5)), Severity::Medium);
        assert_eq!(magnitude_severity(Some(4.0)), Severity::High);
        assert_eq!(magnitude_severity(None), Severity::Low);
    }
}

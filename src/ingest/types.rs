// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{Category, Severity};
use crate::geocode::LocationTier;

/// Incident feed identifiers. OpenWeather is deliberately absent: it feeds
/// the ambient weather cache, not the incident pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Gdelt,
    Usgs,
    Meteo,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::Gdelt, SourceId::Usgs, SourceId::Meteo];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Gdelt => "gdelt",
            SourceId::Usgs => "usgs",
            SourceId::Meteo => "meteo",
        }
    }

    pub fn parse(input: &str) -> Option<SourceId> {
        match input.trim().to_ascii_lowercase().as_str() {
            "gdelt" => Some(SourceId::Gdelt),
            "usgs" => Some(SourceId::Usgs),
            "meteo" => Some(SourceId::Meteo),
            _ => None,
        }
    }

    /// Broad text-search feeds go through the inclusion filter; structured
    /// feeds (seismic, weather) are trusted as-is.
    pub fn is_text_search(&self) -> bool {
        matches!(self, SourceId::Gdelt)
    }

    /// Seismic events keep their coordinates even outside the Attica bbox.
    pub fn is_bbox_exempt(&self) -> bool {
        matches!(self, SourceId::Usgs)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider output before normalization. Lives for one pipeline run only.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Parsed by the provider's own timestamp parser; defaults to "now" on
    /// unparseable input rather than dropping the item.
    pub published_at: DateTime<Utc>,
    pub source: SourceId,
    /// Free text the resolver may use as a geolocation fallback.
    pub query_hint: Option<String>,
    /// Structured providers may pre-assign these; text feeds leave them to
    /// the classifier.
    pub severity: Option<Severity>,
    pub category: Option<Category>,
}

impl RawCandidate {
    pub fn new(source: SourceId, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            url: None,
            domain: None,
            lat: None,
            lng: None,
            published_at: Utc::now(),
            source,
            query_hint: None,
            severity: None,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
}

/// Canonical pipeline output: one geolocated, classified, deduplicated
/// incident. Also the persisted row shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIncident {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub category: Category,
    pub severity: Severity,
    /// 0–1, derived from how the coordinates were obtained.
    pub confidence: f64,
    pub location_label: String,
    pub location_confidence: LocationTier,
    pub source: SourceId,
    pub published_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: IncidentStatus,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the latest raw candidates. Empty results are success; only
    /// network/parse problems are errors.
    async fn fetch_latest(&self, window_minutes: i64, limit: usize) -> Result<Vec<RawCandidate>>;
    fn id(&self) -> SourceId;
}

/// Per-provider outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub source: SourceId,
    pub status: ProviderHealth,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Everything one successful pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub incidents: Vec<ResolvedIncident>,
    pub provider_status: Vec<ProviderStatus>,
    pub filter_stats: FilterStats,
}

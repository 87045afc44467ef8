// src/api.rs
//! HTTP surface. All incident reads are answered from the cache; the only
//! endpoint that touches the store is `/api/incidents/stored`. Parameter
//! handling: a missing parameter takes its default, an unparseable one is a
//! 400, a parseable-but-out-of-range number is clamped.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::cache::{
    IncidentCache, IncidentQuery, IncidentsPayload, SourceHealth, WeatherCache, WeatherHealth,
};
use crate::classify::Category;
use crate::config::{clamp_limit, clamp_window_minutes, DEFAULT_LIMIT, DEFAULT_WINDOW_MINUTES};
use crate::ingest::providers::openweather::WeatherSnapshot;
use crate::ingest::types::{IncidentStatus, ResolvedIncident, SourceId};
use crate::store::{IncidentStore, ListFilters};

#[derive(Clone)]
pub struct AppState {
    pub incidents: Arc<IncidentCache>,
    pub weather: Arc<WeatherCache>,
    pub store: Arc<dyn IncidentStore>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/incidents", get(get_incidents))
        .route("/api/incidents/stored", get(get_stored_incidents))
        .route("/api/health", get(get_health))
        .route("/api/weather", get(get_weather))
        .fallback_service(ServeDir::new("public"))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

type BadRequest = (StatusCode, Json<ApiError>);

fn bad_request(message: impl Into<String>) -> BadRequest {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncidentsParams {
    window: Option<String>,
    limit: Option<String>,
    category: Option<String>,
    sources: Option<String>,
}

fn parse_incident_query(params: &IncidentsParams) -> Result<IncidentQuery, BadRequest> {
    let window_minutes = match params.window.as_deref() {
        None => DEFAULT_WINDOW_MINUTES,
        Some(raw) => clamp_window_minutes(
            raw.trim()
                .parse::<i64>()
                .map_err(|_| bad_request(format!("invalid window: {raw:?}")))?,
        ),
    };
    let limit = match params.limit.as_deref() {
        None => DEFAULT_LIMIT,
        Some(raw) => clamp_limit(
            raw.trim()
                .parse::<usize>()
                .map_err(|_| bad_request(format!("invalid limit: {raw:?}")))?,
        ),
    };
    let category = match params.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Category::parse(raw).ok_or_else(|| bad_request(format!("unknown category: {raw:?}")))?,
        ),
    };
    let sources = match params.sources.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            let mut parsed = Vec::new();
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                parsed.push(
                    SourceId::parse(item)
                        .ok_or_else(|| bad_request(format!("unknown source: {item:?}")))?,
                );
            }
            Some(parsed)
        }
    };

    Ok(IncidentQuery {
        window_minutes,
        limit,
        category,
        sources,
    })
}

async fn get_incidents(
    State(state): State<AppState>,
    Query(params): Query<IncidentsParams>,
) -> Result<Json<IncidentsPayload>, BadRequest> {
    let query = parse_incident_query(&params)?;
    Ok(Json(state.incidents.query(&query)))
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredParams {
    status: Option<String>,
    min_confidence: Option<String>,
    since: Option<String>,
    source: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredPayload {
    incidents: Vec<ResolvedIncident>,
    total: usize,
}

fn parse_stored_filters(params: &StoredParams) -> Result<ListFilters, BadRequest> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some("active") => Some(IncidentStatus::Active),
        Some(raw) => return Err(bad_request(format!("unknown status: {raw:?}"))),
    };
    let min_confidence = match params.min_confidence.as_deref() {
        None => None,
        Some(raw) => {
            let value: f64 = raw
                .trim()
                .parse()
                .map_err(|_| bad_request(format!("invalid minConfidence: {raw:?}")))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(bad_request(format!("minConfidence out of range: {value}")));
            }
            Some(value)
        }
    };
    let since = match params.since.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| bad_request(format!("invalid since timestamp: {raw:?}")))?,
        ),
    };
    let source = match params.source.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => {
            Some(SourceId::parse(raw).ok_or_else(|| bad_request(format!("unknown source: {raw:?}")))?)
        }
    };

    Ok(ListFilters {
        status,
        min_confidence,
        since,
        source,
    })
}

async fn get_stored_incidents(
    State(state): State<AppState>,
    Query(params): Query<StoredParams>,
) -> Result<Json<StoredPayload>, BadRequest> {
    let filters = parse_stored_filters(&params)?;
    let incidents = state
        .store
        .list(&filters)
        .await
        .map_err(|err| bad_request(err.to_string()))?;
    let total = incidents.len();
    Ok(Json(StoredPayload { incidents, total }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthPayload {
    status: &'static str,
    sources: Vec<SourceHealth>,
    weather: WeatherHealth,
    generated_at: DateTime<Utc>,
}

async fn get_health(State(state): State<AppState>) -> Json<HealthPayload> {
    let sources = state.incidents.health();
    let weather = state.weather.health();
    let status = if sources
        .iter()
        .all(|s| s.status == crate::cache::FreshnessStatus::Ok)
    {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthPayload {
        status,
        sources,
        weather,
        generated_at: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WeatherPayload {
    snapshot: Option<WeatherSnapshot>,
    health: WeatherHealth,
}

async fn get_weather(State(state): State<AppState>) -> Json<WeatherPayload> {
    Json(WeatherPayload {
        snapshot: state.weather.snapshot(),
        health: state.weather.health(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_params_use_defaults() {
        let query = parse_incident_query(&IncidentsParams::default()).expect("defaults");
        assert_eq!(query.window_minutes, DEFAULT_WINDOW_MINUTES);
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert!(query.category.is_none());
        assert!(query.sources.is_none());
    }

    #[test]
    fn numeric_params_are_clamped_not_rejected() {
        let params = IncidentsParams {
            window: Some("999999".to_string()),
            limit: Some("1".to_string()),
            ..Default::default()
        };
        let query = parse_incident_query(&params).expect("clamped");
        assert_eq!(query.window_minutes, crate::config::MAX_WINDOW_MINUTES);
        assert_eq!(query.limit, crate::config::MIN_LIMIT);
    }

    #[test]
    fn unparseable_params_are_client_errors() {
        let params = IncidentsParams {
            window: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(parse_incident_query(&params).is_err());

        let params = IncidentsParams {
            category: Some("ufo".to_string()),
            ..Default::default()
        };
        assert!(parse_incident_query(&params).is_err());

        let params = StoredParams {
            min_confidence: Some("high".to_string()),
            ..Default::default()
        };
        assert!(parse_stored_filters(&params).is_err());
    }

    #[test]
    fn source_list_parses_comma_separated() {
        let params = IncidentsParams {
            sources: Some("gdelt, usgs".to_string()),
            ..Default::default()
        };
        let query = parse_incident_query(&params).expect("sources");
        assert_eq!(query.sources, Some(vec![SourceId::Gdelt, SourceId::Usgs]));
    }
}

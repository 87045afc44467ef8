// src/ingest/mod.rs
//! The ingestion normalization pipeline: fetch → geolocate → classify →
//! filter → deduplicate. Providers are fanned out concurrently and may fail
//! independently; a cycle only fails as a whole when every provider failed.

pub mod providers;
pub mod scheduler;
pub mod types;

use anyhow::{anyhow, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use uuid::Uuid;

use crate::classify::classify_incident;
use crate::config::GEOCODER_MAX_LOOKUPS_PER_RUN;
use crate::dedup::dedupe_incidents;
use crate::filter::{evaluate_inclusion, has_attica_location_signal};
use crate::geocode::{Geocoder, LocationTier, ResolvedLocation};
use crate::ingest::types::{
    FilterStats, IncidentStatus, PipelineRun, ProviderHealth, ProviderStatus, RawCandidate,
    ResolvedIncident, SourceProvider,
};
use crate::region::{is_inside_attica, text_looks_athens_relevant};

/// Namespace for content-derived incident ids (UUIDv5).
const INCIDENT_UUID_NAMESPACE: Uuid = Uuid::from_u128(0xd3f27d9c_5fc3_40c4_9f39_31eac5fdbf66);

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_candidates_total", "Raw candidates returned by providers.");
        describe_counter!("ingest_kept_total", "Incidents kept after the full pipeline.");
        describe_counter!(
            "ingest_filtered_total",
            "Candidates rejected by the inclusion filter."
        );
        describe_counter!("ingest_dedup_total", "Incidents removed by deduplication.");
        describe_counter!(
            "ingest_unresolvable_total",
            "Candidates dropped because no location tier could be established."
        );
        describe_counter!("ingest_provider_errors_total", "Provider fetch/parse errors.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last completed."
        );
    });
}

/// Strip tracking parameters and normalize the URL text. Unparseable input
/// is passed through trimmed rather than discarded.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            let kept: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(key, _)| !key.starts_with("utm_"))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                parsed.set_query(None);
            } else {
                parsed
                    .query_pairs_mut()
                    .clear()
                    .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
            Some(parsed.to_string())
        }
        Err(_) => Some(raw.to_string()),
    }
}

/// Content-derived deterministic id: re-ingesting the same event yields the
/// same id, so the store upserts instead of duplicating.
pub fn deterministic_incident_id(
    source: types::SourceId,
    canonical_url: Option<&str>,
    title: &str,
    lat: f64,
    lng: f64,
) -> Uuid {
    let title_key: String = title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let key = match canonical_url {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => title_key,
    };
    let seed = format!("{source}|{key}|{lat:.5}|{lng:.5}");
    Uuid::new_v5(&INCIDENT_UUID_NAMESPACE, seed.as_bytes())
}

/// Resolve one raw candidate into an incident, or `None` when no location
/// tier can be established (not region-relevant and no usable coordinates).
pub async fn normalize_candidate(
    raw: &RawCandidate,
    allow_remote_lookup: bool,
    geocoder: &Geocoder,
) -> Option<ResolvedIncident> {
    let title = {
        let trimmed = raw.title.trim();
        if trimmed.is_empty() {
            "Athens event".to_string()
        } else {
            trimmed.to_string()
        }
    };
    let canonical_url = raw.url.as_deref().and_then(canonicalize_url);
    let query_hint = raw.query_hint.as_deref().unwrap_or("");

    let has_coords = matches!((raw.lat, raw.lng), (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite());

    let location = if has_coords {
        let (lat, lng) = (raw.lat.unwrap_or_default(), raw.lng.unwrap_or_default());
        if is_inside_attica(lat, lng) || raw.source.is_bbox_exempt() {
            Some(ResolvedLocation {
                lat,
                lng,
                label: "Source coordinates".to_string(),
                tier: LocationTier::Source,
            })
        } else {
            resolve_by_text(raw, &title, query_hint, allow_remote_lookup, geocoder).await
        }
    } else {
        resolve_by_text(raw, &title, query_hint, allow_remote_lookup, geocoder).await
    };

    let location = location?;

    let (inferred_category, inferred_severity) = classify_incident(&title);
    let category = raw.category.unwrap_or(inferred_category);
    let severity = raw.severity.unwrap_or(inferred_severity);

    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| canonical_url.clone());

    let now = Utc::now();
    Some(ResolvedIncident {
        id: deterministic_incident_id(
            raw.source,
            canonical_url.as_deref(),
            &title,
            location.lat,
            location.lng,
        ),
        title,
        description,
        url: canonical_url,
        lat: location.lat,
        lng: location.lng,
        category,
        severity,
        confidence: location.tier.confidence(),
        location_label: location.label,
        location_confidence: location.tier,
        source: raw.source,
        published_at: raw.published_at,
        first_seen_at: raw.published_at,
        last_seen_at: now,
        status: IncidentStatus::Active,
    })
}

async fn resolve_by_text(
    raw: &RawCandidate,
    title: &str,
    query_hint: &str,
    allow_remote_lookup: bool,
    geocoder: &Geocoder,
) -> Option<ResolvedLocation> {
    let text_blob = format!(
        "{title} {} {query_hint}",
        raw.domain.as_deref().unwrap_or_default()
    );
    if !text_looks_athens_relevant(&text_blob) {
        return None;
    }
    Some(geocoder.resolve(title, query_hint, allow_remote_lookup).await)
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineParams {
    pub window_minutes: i64,
    pub limit: usize,
}

/// Run one full ingestion cycle over the given providers.
pub async fn run(
    providers: &[std::sync::Arc<dyn SourceProvider>],
    geocoder: &Geocoder,
    params: PipelineParams,
) -> Result<PipelineRun> {
    ensure_metrics_described();

    // Fan out all provider fetches concurrently; collect per-provider outcomes.
    let fetches = providers.iter().map(|provider| {
        let provider = provider.clone();
        async move {
            let outcome = provider
                .fetch_latest(params.window_minutes, params.limit)
                .await;
            (provider.id(), outcome)
        }
    });
    let outcomes = futures::future::join_all(fetches).await;

    let mut provider_status = Vec::with_capacity(outcomes.len());
    let mut raw_candidates: Vec<RawCandidate> = Vec::new();
    for (source, outcome) in outcomes {
        match outcome {
            Ok(items) => {
                counter!("ingest_candidates_total").increment(items.len() as u64);
                provider_status.push(ProviderStatus {
                    source,
                    status: ProviderHealth::Ok,
                    count: items.len(),
                    error: None,
                });
                raw_candidates.extend(items);
            }
            Err(err) => {
                tracing::warn!(provider = %source, error = %err, "provider fetch failed");
                counter!("ingest_provider_errors_total").increment(1);
                provider_status.push(ProviderStatus {
                    source,
                    status: ProviderHealth::Error,
                    count: 0,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    // A cycle with zero surviving providers must not be cached as success.
    if provider_status
        .iter()
        .all(|status| status.status == ProviderHealth::Error)
    {
        let combined = provider_status
            .iter()
            .filter_map(|status| {
                status
                    .error
                    .as_ref()
                    .map(|err| format!("{}: {err}", status.source))
            })
            .collect::<Vec<_>>()
            .join(" | ");
        return Err(anyhow!(
            "all providers failed: {}",
            if combined.is_empty() {
                "no detail".to_string()
            } else {
                combined
            }
        ));
    }

    // Inclusion filter applies to text-search feeds only.
    let mut filter_stats = FilterStats::default();
    let mut filtered: Vec<RawCandidate> = Vec::with_capacity(raw_candidates.len());
    for raw in raw_candidates {
        if !raw.source.is_text_search() {
            filtered.push(raw);
            continue;
        }

        filter_stats.total += 1;
        let description = raw.description.as_deref().unwrap_or_default();
        let has_source_location = matches!(
            (raw.lat, raw.lng),
            (Some(lat), Some(lng)) if is_inside_attica(lat, lng)
        );
        let has_text_location =
            has_attica_location_signal(&format!("{} {description}", raw.title));

        let verdict = evaluate_inclusion(
            &raw.title,
            description,
            has_source_location || has_text_location,
        );
        if verdict.accepted {
            filter_stats.passed += 1;
            filtered.push(raw);
        } else {
            filter_stats.failed += 1;
            counter!("ingest_filtered_total").increment(1);
            tracing::debug!(
                reason = verdict.reason,
                title = %raw.title,
                "candidate rejected by inclusion filter"
            );
        }
    }

    if filter_stats.total > 0 {
        tracing::info!(
            total = filter_stats.total,
            passed = filter_stats.passed,
            failed = filter_stats.failed,
            "inclusion filter cycle totals"
        );
    }

    // Normalize in input order; only the first N candidates may geocode
    // remotely, which bounds external call volume per cycle.
    let mut normalized: Vec<ResolvedIncident> = Vec::with_capacity(filtered.len());
    for (index, raw) in filtered.iter().enumerate() {
        let allow_remote = index < GEOCODER_MAX_LOOKUPS_PER_RUN;
        match normalize_candidate(raw, allow_remote, geocoder).await {
            Some(incident) => normalized.push(incident),
            None => {
                counter!("ingest_unresolvable_total").increment(1);
            }
        }
    }

    normalized.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let before_dedup = normalized.len();
    let mut incidents = dedupe_incidents(normalized);
    counter!("ingest_dedup_total").increment((before_dedup - incidents.len()) as u64);

    incidents.truncate(params.limit);
    counter!("ingest_kept_total").increment(incidents.len() as u64);
    gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);

    Ok(PipelineRun {
        incidents,
        provider_status,
        filter_stats,
    })
}

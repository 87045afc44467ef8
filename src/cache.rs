// src/cache.rs
//! Serving-side cache. Holds the most recent successful pipeline output per
//! polling group plus staleness metadata; read queries never trigger a
//! pipeline run. Snapshots are replaced whole, so readers see either the old
//! or the new state, never a mix.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{Category, Severity};
use crate::ingest::providers::openweather::WeatherSnapshot;
use crate::ingest::types::{ProviderHealth, ProviderStatus, ResolvedIncident, SourceId};

#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub incidents: Vec<ResolvedIncident>,
    pub provider_status: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Default)]
struct SourceMeta {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    next_poll: Option<DateTime<Utc>>,
    poll_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessStatus {
    Ok,
    Stale,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source: SourceId,
    pub status: FreshnessStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub next_poll: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentTotals {
    pub total: usize,
    pub high: usize,
}

/// What `/api/incidents` returns: filtered snapshot plus enough metadata for
/// the client to distinguish "nothing matched" from "ingestion is broken".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentsPayload {
    pub fetched_at: Option<DateTime<Utc>>,
    pub window_minutes: i64,
    pub incidents: Vec<ResolvedIncident>,
    pub totals: IncidentTotals,
    pub provider_status: Vec<ProviderStatus>,
    pub stale: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
    pub window_minutes: i64,
    pub limit: usize,
    pub category: Option<Category>,
    pub sources: Option<Vec<SourceId>>,
}

#[derive(Default)]
pub struct IncidentCache {
    groups: RwLock<HashMap<&'static str, GroupSnapshot>>,
    sources: RwLock<HashMap<SourceId, SourceMeta>>,
}

impl IncidentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful run for a polling group; replaces that group's
    /// snapshot atomically and refreshes per-source metadata.
    pub fn store_run(&self, group: &'static str, snapshot: GroupSnapshot) {
        let now = snapshot.fetched_at;
        {
            let mut sources = self.sources.write().expect("cache sources lock poisoned");
            for status in &snapshot.provider_status {
                let meta = sources.entry(status.source).or_default();
                match status.status {
                    ProviderHealth::Ok => {
                        meta.last_success = Some(now);
                        meta.last_error = None;
                        meta.last_error_at = None;
                    }
                    ProviderHealth::Error => {
                        meta.last_error = status.error.clone();
                        meta.last_error_at = Some(now);
                    }
                }
            }
        }
        let mut groups = self.groups.write().expect("cache groups lock poisoned");
        groups.insert(group, snapshot);
    }

    /// Record a fully failed run; the previous snapshot stays in place and
    /// keeps serving (stale) until a later run succeeds.
    pub fn store_failure(&self, sources: &[SourceId], error: &str) {
        let now = Utc::now();
        let mut map = self.sources.write().expect("cache sources lock poisoned");
        for source in sources {
            let meta = map.entry(*source).or_default();
            meta.last_error = Some(error.to_string());
            meta.last_error_at = Some(now);
        }
    }

    pub fn set_next_poll(&self, sources: &[SourceId], next: DateTime<Utc>, interval: Duration) {
        let mut map = self.sources.write().expect("cache sources lock poisoned");
        for source in sources {
            let meta = map.entry(*source).or_default();
            meta.next_poll = Some(next);
            meta.poll_interval = Some(interval);
        }
    }

    fn source_freshness(meta: &SourceMeta, now: DateTime<Utc>) -> FreshnessStatus {
        let Some(last_success) = meta.last_success else {
            return if meta.last_error.is_some() {
                FreshnessStatus::Error
            } else {
                FreshnessStatus::Stale
            };
        };

        // A failure recorded after the last success means the most recent
        // attempt failed; that wins over success age.
        if meta
            .last_error_at
            .map(|at| at >= last_success)
            .unwrap_or(false)
        {
            return FreshnessStatus::Error;
        }

        // Fresh enough: within twice the polling interval.
        let allowed = meta
            .poll_interval
            .map(|interval| interval * 2)
            .unwrap_or_else(|| Duration::from_secs(30 * 60));
        let age = now.signed_duration_since(last_success);
        if age.to_std().map(|age| age <= allowed).unwrap_or(true) {
            return FreshnessStatus::Ok;
        }
        if meta.last_error.is_some() {
            FreshnessStatus::Error
        } else {
            FreshnessStatus::Stale
        }
    }

    pub fn health(&self) -> Vec<SourceHealth> {
        let now = Utc::now();
        let sources = self.sources.read().expect("cache sources lock poisoned");
        let mut out: Vec<SourceHealth> = SourceId::ALL
            .iter()
            .map(|source| {
                let meta = sources.get(source).cloned().unwrap_or_default();
                SourceHealth {
                    source: *source,
                    status: Self::source_freshness(&meta, now),
                    last_success: meta.last_success,
                    next_poll: meta.next_poll,
                    last_error: meta.last_error,
                }
            })
            .collect();
        out.sort_by_key(|health| health.source.as_str());
        out
    }

    /// Answer a read query from the cached snapshots. Incidents from all
    /// polling groups are merged, deduplicated by id (freshest wins),
    /// filtered and truncated.
    pub fn query(&self, query: &IncidentQuery) -> IncidentsPayload {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::minutes(query.window_minutes);

        let groups = self.groups.read().expect("cache groups lock poisoned");

        let mut fetched_at: Option<DateTime<Utc>> = None;
        let mut provider_status: Vec<ProviderStatus> = Vec::new();
        let mut merged: HashMap<uuid::Uuid, ResolvedIncident> = HashMap::new();
        for snapshot in groups.values() {
            fetched_at = Some(match fetched_at {
                Some(current) => current.max(snapshot.fetched_at),
                None => snapshot.fetched_at,
            });
            provider_status.extend(snapshot.provider_status.iter().cloned());
            for incident in &snapshot.incidents {
                merged
                    .entry(incident.id)
                    .and_modify(|existing| {
                        if incident.last_seen_at > existing.last_seen_at {
                            *existing = incident.clone();
                        }
                    })
                    .or_insert_with(|| incident.clone());
            }
        }
        drop(groups);

        let mut incidents: Vec<ResolvedIncident> = merged
            .into_values()
            .filter(|incident| incident.published_at >= cutoff)
            .filter(|incident| {
                query
                    .category
                    .map(|category| incident.category == category)
                    .unwrap_or(true)
            })
            .filter(|incident| {
                query
                    .sources
                    .as_ref()
                    .map(|sources| sources.contains(&incident.source))
                    .unwrap_or(true)
            })
            .collect();
        incidents.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        incidents.truncate(query.limit);

        let totals = IncidentTotals {
            total: incidents.len(),
            high: incidents
                .iter()
                .filter(|incident| incident.severity == Severity::High)
                .count(),
        };
        provider_status.sort_by_key(|status| status.source.as_str());

        IncidentsPayload {
            fetched_at,
            window_minutes: query.window_minutes,
            incidents,
            totals,
            provider_status,
            stale: self.is_stale(fetched_at, now),
        }
    }

    fn is_stale(&self, fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if fetched_at.is_none() {
            return true;
        }
        let sources = self.sources.read().expect("cache sources lock poisoned");
        sources
            .values()
            .any(|meta| Self::source_freshness(meta, now) != FreshnessStatus::Ok)
    }
}

#[derive(Debug, Clone, Default)]
struct WeatherState {
    snapshot: Option<WeatherSnapshot>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    next_poll: Option<DateTime<Utc>>,
    poll_interval: Option<Duration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherHealth {
    pub source: &'static str,
    pub status: FreshnessStatus,
    pub last_success: Option<DateTime<Utc>>,
    pub next_poll: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Latest ambient weather reading, maintained by its own polling group.
#[derive(Default)]
pub struct WeatherCache {
    inner: RwLock<WeatherState>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, snapshot: WeatherSnapshot) {
        let mut state = self.inner.write().expect("weather cache lock poisoned");
        state.last_success = Some(snapshot.updated_at);
        state.last_error = None;
        state.last_error_at = None;
        state.snapshot = Some(snapshot);
    }

    pub fn set_error(&self, error: &str) {
        let mut state = self.inner.write().expect("weather cache lock poisoned");
        state.last_error = Some(error.to_string());
        state.last_error_at = Some(Utc::now());
    }

    pub fn set_next_poll(&self, next: DateTime<Utc>, interval: Duration) {
        let mut state = self.inner.write().expect("weather cache lock poisoned");
        state.next_poll = Some(next);
        state.poll_interval = Some(interval);
    }

    pub fn snapshot(&self) -> Option<WeatherSnapshot> {
        self.inner
            .read()
            .expect("weather cache lock poisoned")
            .snapshot
            .clone()
    }

    pub fn health(&self) -> WeatherHealth {
        let state = self.inner.read().expect("weather cache lock poisoned");
        let now = Utc::now();
        let status = match state.last_success {
            None => {
                if state.last_error.is_some() {
                    FreshnessStatus::Error
                } else {
                    FreshnessStatus::Stale
                }
            }
            Some(last_success)
                if state
                    .last_error_at
                    .map(|at| at >= last_success)
                    .unwrap_or(false) =>
            {
                FreshnessStatus::Error
            }
            Some(last_success) => {
                let allowed = state
                    .poll_interval
                    .map(|interval| interval * 2)
                    .unwrap_or_else(|| Duration::from_secs(60 * 60));
                let age = now.signed_duration_since(last_success);
                if age.to_std().map(|age| age <= allowed).unwrap_or(true) {
                    FreshnessStatus::Ok
                } else if state.last_error.is_some() {
                    FreshnessStatus::Error
                } else {
                    FreshnessStatus::Stale
                }
            }
        };

        WeatherHealth {
            source: "openweather",
            status,
            last_success: state.last_success,
            next_poll: state.next_poll,
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::LocationTier;
    use crate::ingest::types::IncidentStatus;
    use uuid::Uuid;

    fn incident(title: &str, source: SourceId, severity: Severity, hours_ago: i64) -> ResolvedIncident {
        let published = Utc::now() - chrono::Duration::hours(hours_ago);
        ResolvedIncident {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, title.as_bytes()),
            title: title.to_string(),
            description: None,
            url: None,
            lat: 37.98,
            lng: 23.72,
            category: Category::Fire,
            severity,
            confidence: 0.85,
            location_label: "kolonaki".to_string(),
            location_confidence: LocationTier::Anchor,
            source,
            published_at: published,
            first_seen_at: published,
            last_seen_at: Utc::now(),
            status: IncidentStatus::Active,
        }
    }

    fn ok_status(source: SourceId, count: usize) -> ProviderStatus {
        ProviderStatus {
            source,
            status: ProviderHealth::Ok,
            count,
            error: None,
        }
    }

    #[test]
    fn empty_cache_reads_as_stale() {
        let cache = IncidentCache::new();
        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            ..Default::default()
        });
        assert!(payload.stale);
        assert!(payload.incidents.is_empty());
        assert!(payload.fetched_at.is_none());
    }

    #[test]
    fn query_filters_by_window_category_and_source() {
        let cache = IncidentCache::new();
        cache.set_next_poll(&[SourceId::Gdelt], Utc::now(), Duration::from_secs(900));
        cache.store_run(
            "news",
            GroupSnapshot {
                fetched_at: Utc::now(),
                incidents: vec![
                    incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 1),
                    incident("Old fire report", SourceId::Gdelt, Severity::High, 90),
                ],
                provider_status: vec![ok_status(SourceId::Gdelt, 2)],
            },
        );

        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            category: Some(Category::Fire),
            sources: Some(vec![SourceId::Gdelt]),
        });
        assert_eq!(payload.totals.total, 1);
        assert_eq!(payload.totals.high, 1);
        assert!(!payload.stale);

        let none = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            category: Some(Category::Protest),
            sources: None,
        });
        assert_eq!(none.totals.total, 0);
        // Empty because nothing matched, not because ingestion failed.
        assert!(!none.stale);
    }

    #[test]
    fn failed_refresh_keeps_old_snapshot_and_flags_stale() {
        let cache = IncidentCache::new();
        cache.set_next_poll(&[SourceId::Gdelt], Utc::now(), Duration::from_secs(900));
        cache.store_run(
            "news",
            GroupSnapshot {
                fetched_at: Utc::now() - chrono::Duration::hours(2),
                incidents: vec![incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 2)],
                provider_status: vec![ok_status(SourceId::Gdelt, 1)],
            },
        );
        cache.store_failure(&[SourceId::Gdelt], "all providers failed");

        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            ..Default::default()
        });
        // Old data still served, but flagged.
        assert_eq!(payload.totals.total, 1);
        assert!(payload.stale);

        let health = cache.health();
        let gdelt = health
            .iter()
            .find(|h| h.source == SourceId::Gdelt)
            .expect("gdelt health");
        assert_eq!(gdelt.status, FreshnessStatus::Error);
    }

    #[test]
    fn failed_latest_run_flags_stale_despite_recent_success() {
        let cache = IncidentCache::new();
        cache.set_next_poll(&[SourceId::Gdelt], Utc::now(), Duration::from_secs(900));
        cache.store_run(
            "news",
            GroupSnapshot {
                fetched_at: Utc::now(),
                incidents: vec![incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 1)],
                provider_status: vec![ok_status(SourceId::Gdelt, 1)],
            },
        );
        // The very next cycle fails while the success is still well within
        // the freshness window.
        cache.store_failure(&[SourceId::Gdelt], "all providers failed");

        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            ..Default::default()
        });
        assert_eq!(payload.totals.total, 1);
        assert!(payload.stale);

        let health = cache.health();
        let gdelt = health
            .iter()
            .find(|h| h.source == SourceId::Gdelt)
            .expect("gdelt health");
        assert_eq!(gdelt.status, FreshnessStatus::Error);

        // A later successful run clears the failure again.
        cache.store_run(
            "news",
            GroupSnapshot {
                fetched_at: Utc::now(),
                incidents: vec![incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 1)],
                provider_status: vec![ok_status(SourceId::Gdelt, 1)],
            },
        );
        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            ..Default::default()
        });
        assert!(!payload.stale);
    }

    #[test]
    fn merged_groups_prefer_freshest_copy_of_same_id() {
        let cache = IncidentCache::new();
        let mut older = incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 1);
        older.last_seen_at = Utc::now() - chrono::Duration::hours(1);
        let newer = incident("Fire in Kolonaki", SourceId::Gdelt, Severity::High, 1);

        cache.store_run(
            "news",
            GroupSnapshot {
                fetched_at: Utc::now(),
                incidents: vec![older],
                provider_status: vec![ok_status(SourceId::Gdelt, 1)],
            },
        );
        cache.store_run(
            "seismic",
            GroupSnapshot {
                fetched_at: Utc::now(),
                incidents: vec![newer.clone()],
                provider_status: vec![ok_status(SourceId::Usgs, 0)],
            },
        );

        let payload = cache.query(&IncidentQuery {
            window_minutes: 1440,
            limit: 100,
            ..Default::default()
        });
        assert_eq!(payload.totals.total, 1);
        assert_eq!(payload.incidents[0].last_seen_at, newer.last_seen_at);
    }
}

// src/store.rs
//! Incident persistence behind a trait so the serving layer does not care
//! whether the backing store is in-memory or external. The default in-memory
//! store keeps every incident the pipeline has ever accepted, keyed by the
//! deterministic incident id.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ingest::types::{IncidentStatus, ResolvedIncident, SourceId};

#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    pub status: Option<IncidentStatus>,
    pub min_confidence: Option<f64>,
    pub since: Option<DateTime<Utc>>,
    pub source: Option<SourceId>,
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Insert or refresh incidents. An existing record keeps its original
    /// `first_seen_at`; everything else is replaced by the newer copy.
    /// Returns how many records were newly inserted.
    async fn upsert(&self, incidents: &[ResolvedIncident]) -> Result<usize>;

    /// List stored incidents matching the filters, newest activity first.
    async fn list(&self, filters: &ListFilters) -> Result<Vec<ResolvedIncident>>;
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Uuid, ResolvedIncident>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn upsert(&self, incidents: &[ResolvedIncident]) -> Result<usize> {
        let mut map = self.inner.write().await;
        let mut inserted = 0usize;
        for incident in incidents {
            match map.get_mut(&incident.id) {
                Some(existing) => {
                    let first_seen_at = existing.first_seen_at.min(incident.first_seen_at);
                    *existing = incident.clone();
                    existing.first_seen_at = first_seen_at;
                }
                None => {
                    map.insert(incident.id, incident.clone());
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn list(&self, filters: &ListFilters) -> Result<Vec<ResolvedIncident>> {
        let map = self.inner.read().await;
        let mut out: Vec<ResolvedIncident> = map
            .values()
            .filter(|incident| {
                filters
                    .status
                    .map(|status| incident.status == status)
                    .unwrap_or(true)
            })
            .filter(|incident| {
                filters
                    .min_confidence
                    .map(|min| incident.confidence >= min)
                    .unwrap_or(true)
            })
            .filter(|incident| {
                filters
                    .since
                    .map(|since| incident.last_seen_at >= since)
                    .unwrap_or(true)
            })
            .filter(|incident| {
                filters
                    .source
                    .map(|source| incident.source == source)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(out)
    }
}

// src/dedup.rs
//! Collapses near-duplicate reports in a single left-to-right pass. Input is
//! recency-sorted, so earlier (newer) items win over later (older) ones.
//!
//! Rules per candidate, against already-kept items:
//! 1. exact canonical-URL match → drop;
//! 2. headline similarity ≥ threshold against any kept item published within
//!    72 hours → drop. Matching is cross-source: the common real-world case
//!    is the same event covered by different providers.

use std::collections::HashSet;

use crate::config::DEDUP_WINDOW_HOURS;
use crate::ingest::types::ResolvedIncident;
use crate::similarity::are_likely_duplicate_headlines;

pub fn dedupe_incidents(incidents: Vec<ResolvedIncident>) -> Vec<ResolvedIncident> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept: Vec<ResolvedIncident> = Vec::with_capacity(incidents.len());

    for incident in incidents {
        if let Some(url) = &incident.url {
            if seen_urls.contains(url) {
                continue;
            }
        }

        let duplicate_by_headline = kept.iter().any(|existing| {
            // Minute precision: a 72h30m gap is outside a 72h window.
            let minutes_between = (existing.published_at - incident.published_at)
                .num_minutes()
                .abs();
            if minutes_between > DEDUP_WINDOW_HOURS * 60 {
                return false;
            }
            are_likely_duplicate_headlines(&existing.title, &incident.title)
        });

        if duplicate_by_headline {
            continue;
        }

        if let Some(url) = &incident.url {
            seen_urls.insert(url.clone());
        }
        kept.push(incident);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Category, Severity};
    use crate::geocode::LocationTier;
    use crate::ingest::types::{IncidentStatus, SourceId};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn incident(title: &str, url: Option<&str>, source: SourceId, hours_ago: i64) -> ResolvedIncident {
        let published = Utc::now() - Duration::hours(hours_ago);
        ResolvedIncident {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, title.as_bytes()),
            title: title.to_string(),
            description: None,
            url: url.map(str::to_string),
            lat: 37.98,
            lng: 23.72,
            category: Category::Fire,
            severity: Severity::High,
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

    #[test]
    fn same_url_is_dropped() {
        let out = dedupe_incidents(vec![
            incident("Fire in Kolonaki spreads fast", Some("https://example.gr/a"), SourceId::Gdelt, 1),
            incident("Completely different headline", Some("https://example.gr/a"), SourceId::Gdelt, 2),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Fire in Kolonaki spreads fast");
    }

    #[test]
    fn similar_headlines_within_window_collapse_across_sources() {
        let out = dedupe_incidents(vec![
            incident("Large fire burns warehouses near Piraeus port", None, SourceId::Gdelt, 1),
            incident("Large fire burns warehouses near Piraeus", None, SourceId::Meteo, 3),
        ]);
        assert_eq!(out.len(), 1);
        // Input is newest-first; the newer item survives.
        assert_eq!(out[0].title, "Large fire burns warehouses near Piraeus port");
    }

    #[test]
    fn identical_headlines_outside_window_both_kept() {
        let out = dedupe_incidents(vec![
            incident("Large fire burns warehouses near Piraeus port", None, SourceId::Gdelt, 1),
            incident("Large fire burns warehouses near Piraeus port", None, SourceId::Gdelt, 100),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn window_boundary_uses_minutes_not_truncated_hours() {
        let newer = incident(
            "Large fire burns warehouses near Piraeus port",
            None,
            SourceId::Gdelt,
            0,
        );
        let mut older = newer.clone();
        // 72h30m apart: inside the window under hour truncation, outside it
        // under minute comparison.
        older.published_at = newer.published_at - Duration::minutes(72 * 60 + 30);
        let out = dedupe_incidents(vec![newer, older]);
        assert_eq!(out.len(), 2);

        let newer = incident(
            "Large fire burns warehouses near Piraeus port",
            None,
            SourceId::Gdelt,
            0,
        );
        let mut close = newer.clone();
        close.published_at = newer.published_at - Duration::minutes(71 * 60);
        let out = dedupe_incidents(vec![newer, close]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            incident("Large fire burns warehouses near Piraeus port", Some("https://a.gr/1"), SourceId::Gdelt, 1),
            incident("Warehouses burn in large Piraeus port fire", None, SourceId::Meteo, 2),
            incident("Metro strike planned for Friday morning", None, SourceId::Gdelt, 3),
        ];
        let once = dedupe_incidents(input);
        let twice = dedupe_incidents(once.clone());
        assert_eq!(once, twice);
    }
}

// src/geocode.rs
//! Geolocation resolver: anchor gazetteer first, then (budget permitting)
//! a location phrase extracted from the title is geocoded via Nominatim,
//! otherwise the Athens centroid approximation. Remote lookups are globally
//! rate-limited and cached by normalized query.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{FETCH_TIMEOUT, GEOCODE_CACHE_TTL, NOMINATIM_MIN_INTERVAL};
use crate::region::{
    find_anchor, is_inside_attica, normalize_text, ATHENS_LAT, ATHENS_LNG, ATTICA_MAX_LAT,
    ATTICA_MAX_LNG, ATTICA_MIN_LAT, ATTICA_MIN_LNG,
};

const NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// How the coordinates were obtained. The ordering is meaningful:
/// source > anchor > geocoded > approx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationTier {
    Approx,
    Geocoded,
    Anchor,
    Source,
}

impl LocationTier {
    pub fn confidence(&self) -> f64 {
        match self {
            LocationTier::Source => 0.95,
            LocationTier::Anchor => 0.85,
            LocationTier::Geocoded => 0.75,
            LocationTier::Approx => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationTier::Source => "source",
            LocationTier::Anchor => "anchor",
            LocationTier::Geocoded => "geocoded",
            LocationTier::Approx => "approx",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
    pub tier: LocationTier,
}

impl ResolvedLocation {
    fn approx() -> Self {
        Self {
            lat: ATHENS_LAT,
            lng: ATHENS_LNG,
            label: "Athens (approx)".to_string(),
            tier: LocationTier::Approx,
        }
    }
}

/// Serializes remote calls: a caller arriving before the minimum interval
/// has elapsed waits out the remainder while holding the slot.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: std::time::Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: std::time::Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
struct GeocodeHit {
    lat: f64,
    lng: f64,
    label: String,
}

struct CacheEntry {
    expires_at: Instant,
    value: Option<GeocodeHit>,
}

enum Backend {
    Nominatim {
        client: reqwest::Client,
        limiter: RateLimiter,
        contact: Option<String>,
    },
    /// Canned lookups keyed by normalized query; used by tests.
    Fixture(HashMap<String, GeocodeHit>),
}

pub struct Geocoder {
    backend: Backend,
    cache: Mutex<HashMap<String, CacheEntry>>,
    lookups: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl Geocoder {
    pub fn new(contact: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent("attica-monitor/0.1")
            .build()
            .unwrap_or_default();
        Self {
            backend: Backend::Nominatim {
                client,
                limiter: RateLimiter::new(NOMINATIM_MIN_INTERVAL),
                contact,
            },
            cache: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Fixture variant: lookups resolve from a canned table instead of
    /// Nominatim. Queries are matched after normalization.
    pub fn from_fixtures<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, f64, f64)>,
    {
        let map = entries
            .into_iter()
            .map(|(query, lat, lng)| {
                (
                    normalize_text(&query),
                    GeocodeHit {
                        lat,
                        lng,
                        label: query,
                    },
                )
            })
            .collect();
        Self {
            backend: Backend::Fixture(map),
            cache: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Lookups that went past the local result cache (i.e. would have hit
    /// Nominatim) over this instance's lifetime.
    pub fn remote_lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Resolve free text to a point. Always returns a location; the tier
    /// tells the caller how much to trust it.
    pub async fn resolve(
        &self,
        title: &str,
        query_hint: &str,
        allow_remote_lookup: bool,
    ) -> ResolvedLocation {
        let text_blob = format!("{title} {query_hint}");
        if let Some(anchor) = find_anchor(&text_blob) {
            return ResolvedLocation {
                lat: anchor.lat,
                lng: anchor.lng,
                label: anchor.key.to_string(),
                tier: LocationTier::Anchor,
            };
        }

        if !allow_remote_lookup {
            return ResolvedLocation::approx();
        }

        let Some(hint) = extract_location_hint(title) else {
            return ResolvedLocation::approx();
        };

        match self.geocode_cached(&hint).await {
            Ok(Some(hit)) => ResolvedLocation {
                lat: hit.lat,
                lng: hit.lng,
                label: hit.label,
                tier: LocationTier::Geocoded,
            },
            Ok(None) => ResolvedLocation::approx(),
            Err(err) => {
                // Geocoder trouble must never sink an ingestion cycle.
                debug!(error = %err, hint = %hint, "nominatim lookup failed, approximating");
                ResolvedLocation::approx()
            }
        }
    }

    async fn geocode_cached(&self, query: &str) -> Result<Option<GeocodeHit>> {
        let cache_key = normalize_text(query);
        let now = Instant::now();

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&cache_key) {
                if entry.expires_at > now {
                    return Ok(entry.value.clone());
                }
            }
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let result = match &self.backend {
            Backend::Fixture(map) => Ok(map.get(&cache_key).cloned()),
            Backend::Nominatim {
                client,
                limiter,
                contact,
            } => {
                limiter.acquire().await;
                geocode_remote(client, contact.as_deref(), query).await
            }
        };

        if let Ok(value) = &result {
            let mut cache = self.cache.lock().await;
            cache.insert(
                cache_key,
                CacheEntry {
                    expires_at: Instant::now() + GEOCODE_CACHE_TTL,
                    value: value.clone(),
                },
            );
        }

        result
    }
}

async fn geocode_remote(
    client: &reqwest::Client,
    contact: Option<&str>,
    query: &str,
) -> Result<Option<GeocodeHit>> {
    let viewbox = format!("{ATTICA_MIN_LNG},{ATTICA_MAX_LAT},{ATTICA_MAX_LNG},{ATTICA_MIN_LAT}");
    let mut params: Vec<(&str, String)> = vec![
        ("q", format!("{query}, Athens, Greece")),
        ("format", "jsonv2".into()),
        ("limit", "3".into()),
        ("countrycodes", "gr".into()),
        ("addressdetails", "0".into()),
        ("bounded", "1".into()),
        ("viewbox", viewbox),
    ];
    if let Some(contact) = contact {
        params.push(("email", contact.to_string()));
    }

    let response = client
        .get(NOMINATIM_ENDPOINT)
        .query(&params)
        .header("Accept-Language", "el,en")
        .send()
        .await
        .context("nominatim request")?;

    if !response.status().is_success() {
        return Err(anyhow!("nominatim request failed ({})", response.status()));
    }

    let places: Vec<NominatimPlace> = response.json().await.context("nominatim response body")?;

    // First candidate inside the region wins.
    let hit = places.into_iter().find_map(|place| {
        let lat: f64 = place.lat.trim().parse().ok()?;
        let lng: f64 = place.lon.trim().parse().ok()?;
        if is_inside_attica(lat, lng) {
            Some(GeocodeHit {
                lat,
                lng,
                label: place.display_name.unwrap_or_else(|| query.to_string()),
            })
        } else {
            None
        }
    });

    Ok(hit)
}

/// Pull a short location phrase out of a title via the prepositional pattern
/// ("in/near/at" plus the Greek equivalents).
pub fn extract_location_hint(title: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:\bin\b|\bnear\b|\bat\b|\bστο\b|\bστη\b|\bστην\b|\bσε\b)\s+([A-Za-z\x{0370}-\x{03FF}\s'-]{3,40})",
        )
        .expect("location hint regex")
    });

    let cleaned = title.replace(['|', '•'], " ");
    let captures = re.captures(&cleaned)?;
    let phrase = captures.get(1)?.as_str();
    let phrase = phrase
        .split(['，', ',', '.', ';', ':', '!', '?'])
        .next()
        .unwrap_or("")
        .trim();

    if phrase.is_empty() {
        None
    } else {
        Some(phrase.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anchor_match_beats_everything() {
        let geocoder = Geocoder::new(None);
        let loc = geocoder
            .resolve("Building fire in Kolonaki", "", true)
            .await;
        assert_eq!(loc.tier, LocationTier::Anchor);
        assert_eq!(loc.label, "kolonaki");
        assert!((loc.lat - 37.9789).abs() < 1e-9);
        assert!((loc.lng - 23.7439).abs() < 1e-9);
    }

    #[tokio::test]
    async fn remote_disallowed_falls_back_to_centroid() {
        let geocoder = Geocoder::new(None);
        let loc = geocoder
            .resolve("Crash reported in Elefsina", "", false)
            .await;
        assert_eq!(loc.tier, LocationTier::Approx);
        assert!((loc.lat - ATHENS_LAT).abs() < 1e-9);
        assert_eq!(geocoder.remote_lookup_count(), 0);
    }

    #[tokio::test]
    async fn no_hint_means_approx_even_with_budget() {
        let geocoder = Geocoder::new(None);
        let loc = geocoder.resolve("Massive traffic jam reported", "", true).await;
        assert_eq!(loc.tier, LocationTier::Approx);
        assert_eq!(geocoder.remote_lookup_count(), 0);
    }

    #[tokio::test]
    async fn fixture_lookup_resolves_once_then_serves_from_cache() {
        let geocoder =
            Geocoder::from_fixtures(vec![("Sector Alpha".to_string(), 37.99, 23.73)]);

        let loc = geocoder
            .resolve("Crash reported near Sector Alpha", "", true)
            .await;
        assert_eq!(loc.tier, LocationTier::Geocoded);
        assert!((loc.lat - 37.99).abs() < 1e-9);
        assert_eq!(geocoder.remote_lookup_count(), 1);

        // Second resolution of the same hint hits the result cache.
        let again = geocoder
            .resolve("Crash reported near Sector Alpha", "", true)
            .await;
        assert_eq!(again.tier, LocationTier::Geocoded);
        assert_eq!(geocoder.remote_lookup_count(), 1);

        // Unknown hints count as a lookup and fall back to the centroid.
        let unknown = geocoder
            .resolve("Crash reported near Sector Omega", "", true)
            .await;
        assert_eq!(unknown.tier, LocationTier::Approx);
        assert_eq!(geocoder.remote_lookup_count(), 2);
    }

    #[test]
    fn hint_extraction_handles_english_and_greek() {
        assert_eq!(
            extract_location_hint("Fire breaks out near Dafni station").as_deref(),
            Some("Dafni station")
        );
        assert_eq!(
            extract_location_hint("Τροχαίο στη Βουλιαγμένης σήμερα").as_deref(),
            Some("Βουλιαγμένης σήμερα")
        );
        assert_eq!(extract_location_hint("No preposition here"), None);
    }

    #[test]
    fn tier_confidence_is_strictly_ordered() {
        assert!(LocationTier::Source.confidence() > LocationTier::Anchor.confidence());
        assert!(LocationTier::Anchor.confidence() > LocationTier::Geocoded.confidence());
        assert!(LocationTier::Geocoded.confidence() > LocationTier::Approx.confidence());
    }
}

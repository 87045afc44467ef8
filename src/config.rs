// src/config.rs
//! Monitor tunables. Fixed limits live here as constants; deploy-specific
//! values (port, API keys, poll intervals) come from the environment.

use std::time::Duration;

pub const DEFAULT_WINDOW_MINUTES: i64 = 24 * 60;
pub const MAX_WINDOW_MINUTES: i64 = 72 * 60;
pub const MIN_WINDOW_MINUTES: i64 = 60;

pub const DEFAULT_LIMIT: usize = 120;
pub const MAX_LIMIT: usize = 400;
pub const MIN_LIMIT: usize = 20;

/// Remote geocoding budget: only the first N candidates of an ingestion
/// cycle may hit Nominatim; the rest resolve via anchor or approximation.
pub const GEOCODER_MAX_LOOKUPS_PER_RUN: usize = 8;

/// Nominatim usage policy: at most one request per interval, serialized.
pub const NOMINATIM_MIN_INTERVAL: Duration = Duration::from_millis(1_100);

/// Geocode results are cached by normalized query for a week.
pub const GEOCODE_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Headline dedup: same-event window and Jaccard threshold.
pub const DEDUP_WINDOW_HOURS: i64 = 72;
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.75;

const DEFAULT_NEWS_POLL_SECS: u64 = 15 * 60;
const DEFAULT_SEISMIC_POLL_SECS: u64 = 5 * 60;
const DEFAULT_WEATHER_POLL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub port: u16,
    pub news_poll_interval: Duration,
    pub seismic_poll_interval: Duration,
    pub weather_poll_interval: Duration,
    pub openweather_api_key: Option<String>,
    pub nominatim_contact: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            news_poll_interval: Duration::from_secs(DEFAULT_NEWS_POLL_SECS),
            seismic_poll_interval: Duration::from_secs(DEFAULT_SEISMIC_POLL_SECS),
            weather_poll_interval: Duration::from_secs(DEFAULT_WEATHER_POLL_SECS),
            openweather_api_key: None,
            nominatim_contact: None,
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            news_poll_interval: env_parse("NEWS_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.news_poll_interval),
            seismic_poll_interval: env_parse("SEISMIC_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.seismic_poll_interval),
            weather_poll_interval: env_parse("WEATHER_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.weather_poll_interval),
            openweather_api_key: env_nonempty("OPENWEATHER_API_KEY"),
            nominatim_contact: env_nonempty("NOMINATIM_CONTACT"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn clamp_window_minutes(requested: i64) -> i64 {
    requested.clamp(MIN_WINDOW_MINUTES, MAX_WINDOW_MINUTES)
}

pub fn clamp_limit(requested: usize) -> usize {
    requested.clamp(MIN_LIMIT, MAX_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_and_limit_are_clamped() {
        assert_eq!(clamp_window_minutes(10), MIN_WINDOW_MINUTES);
        assert_eq!(clamp_window_minutes(100_000), MAX_WINDOW_MINUTES);
        assert_eq!(clamp_window_minutes(1440), 1440);
        assert_eq!(clamp_limit(1), MIN_LIMIT);
        assert_eq!(clamp_limit(5_000), MAX_LIMIT);
    }
}

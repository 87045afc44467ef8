// src/ingest/providers/gdelt.rs
//! GDELT doc-search adapter: broad text search for Athens/Attica incident
//! coverage in Greek and English news. This is the noisy feed the inclusion
//! filter exists for.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::ingest::types::{RawCandidate, SourceId, SourceProvider};

const GDELT_ENDPOINT: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

pub const GDELT_QUERY: &str =
    "(Athens OR Αθήνα OR Attica OR Αττική) (incident OR protest OR fire OR explosion OR crime OR police OR accident)";

#[derive(Debug, Deserialize)]
struct DocResponse {
    #[serde(default)]
    articles: Vec<DocArticle>,
}

#[derive(Debug, Deserialize)]
struct DocArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    seendate: Option<String>,
}

/// GDELT timestamps look like `20240101T120000Z`; anything unparseable
/// defaults to "now" rather than dropping the article.
pub fn parse_seendate(input: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(input.trim(), "%Y%m%dT%H%M%SZ")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(input.trim()).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture(String),
}

pub struct GdeltProvider {
    mode: Mode,
}

impl GdeltProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    /// Parse a pre-fetched response body; used by tests.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn parse_body(body: &str) -> Result<Vec<RawCandidate>> {
        // GDELT occasionally answers rate-limit text with a 200; surface it
        // as a provider error instead of a confusing serde failure.
        let trimmed = body.trim_start();
        if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
            let snippet: String = trimmed.chars().take(120).collect();
            return Err(anyhow!("gdelt returned non-JSON response: {snippet}"));
        }

        let response: DocResponse = serde_json::from_str(trimmed).context("parsing gdelt json")?;
        let candidates = response
            .articles
            .into_iter()
            .map(|article| {
                let mut raw = RawCandidate::new(
                    SourceId::Gdelt,
                    article.title.unwrap_or_else(|| "Athens event".to_string()),
                );
                raw.title =
                    html_escape::decode_html_entities(&raw.title).trim().to_string();
                raw.url = article.url.filter(|u| !u.trim().is_empty());
                raw.domain = article.domain;
                raw.published_at = article
                    .seendate
                    .as_deref()
                    .map(parse_seendate)
                    .unwrap_or_else(Utc::now);
                raw.query_hint = Some(GDELT_QUERY.to_string());
                raw
            })
            .collect();
        Ok(candidates)
    }
}

#[async_trait]
impl SourceProvider for GdeltProvider {
    async fn fetch_latest(&self, window_minutes: i64, limit: usize) -> Result<Vec<RawCandidate>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body),
            Mode::Http { client } => {
                // GDELT caps maxrecords well below our serving limit.
                let bounded_limit = limit.clamp(20, 120);
                let query = format!("{GDELT_QUERY} (sourcelang:greek OR sourcelang:english)");

                let body = client
                    .get(GDELT_ENDPOINT)
                    .query(&[
                        ("query", query.as_str()),
                        ("mode", "artlist"),
                        ("maxrecords", &bounded_limit.to_string()),
                        ("timespan", &window_minutes.to_string()),
                        ("sort", "DateDesc"),
                        ("format", "json"),
                    ])
                    .send()
                    .await
                    .context("gdelt request")?
                    .error_for_status()
                    .context("gdelt status")?
                    .text()
                    .await
                    .context("gdelt body")?;

                Self::parse_body(&body)
            }
        }
    }

    fn id(&self) -> SourceId {
        SourceId::Gdelt
    }
}

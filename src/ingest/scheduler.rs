// src/ingest/scheduler.rs
//! Background polling. Sources are grouped by cadence (news, seismic,
//! weather-alerts) and each group runs on its own interval. A per-group
//! guard enforces at most one run in flight; a tick that arrives while the
//! previous run is still going is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::cache::{GroupSnapshot, IncidentCache, WeatherCache};
use crate::config::MonitorConfig;
use crate::geocode::Geocoder;
use crate::ingest::providers::openweather;
use crate::ingest::types::{SourceId, SourceProvider};
use crate::ingest::{self, PipelineParams};
use crate::store::IncidentStore;

/// At-most-one-in-flight guard. `try_acquire` hands out a permit only when
/// no other permit is live; dropping the permit releases the slot.
#[derive(Clone, Default)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

pub struct RunPermit {
    busy: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<RunPermit> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(RunPermit {
                busy: Arc::clone(&self.busy),
            })
        } else {
            None
        }
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

pub struct PollGroup {
    pub name: &'static str,
    pub interval: Duration,
    pub providers: Vec<Arc<dyn SourceProvider>>,
}

impl PollGroup {
    fn source_ids(&self) -> Vec<SourceId> {
        self.providers.iter().map(|provider| provider.id()).collect()
    }
}

async fn run_group_once(
    group: &PollGroup,
    geocoder: &Geocoder,
    cache: &IncidentCache,
    store: &dyn IncidentStore,
    params: PipelineParams,
) {
    let sources = group.source_ids();
    match ingest::run(&group.providers, geocoder, params).await {
        Ok(run) => {
            counter!("ingest_runs_total", "group" => group.name).increment(1);
            gauge!("ingest_pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
            tracing::info!(
                group = group.name,
                kept = run.incidents.len(),
                candidates = run.filter_stats.total,
                filtered = run.filter_stats.failed,
                "poll group refreshed"
            );
            if let Err(err) = store.upsert(&run.incidents).await {
                tracing::warn!(group = group.name, error = %err, "incident store upsert failed");
            }
            cache.store_run(
                group.name,
                GroupSnapshot {
                    fetched_at: Utc::now(),
                    incidents: run.incidents,
                    provider_status: run.provider_status,
                },
            );
        }
        Err(err) => {
            counter!("ingest_run_failures_total", "group" => group.name).increment(1);
            tracing::warn!(group = group.name, error = %err, "poll group failed, keeping previous snapshot");
            cache.store_failure(&sources, &err.to_string());
        }
    }
}

/// Spawn a polling loop for one source group. The first run happens
/// immediately; subsequent runs follow the group interval. Each run executes
/// on its own task while the loop keeps consuming ticks, so a tick arriving
/// during a slow run is skipped, never queued.
pub fn spawn_poll_group(
    group: PollGroup,
    geocoder: Arc<Geocoder>,
    cache: Arc<IncidentCache>,
    store: Arc<dyn IncidentStore>,
    params: PipelineParams,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let group = Arc::new(group);
        let guard = RunGuard::new();
        let mut ticker = tokio::time::interval(group.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            cache.set_next_poll(
                &group.source_ids(),
                Utc::now() + chrono::Duration::from_std(group.interval).unwrap_or_default(),
                group.interval,
            );
            let Some(permit) = guard.try_acquire() else {
                tracing::debug!(group = group.name, "previous run still in flight, skipping tick");
                counter!("ingest_skipped_ticks_total", "group" => group.name).increment(1);
                continue;
            };
            let group = Arc::clone(&group);
            let geocoder = Arc::clone(&geocoder);
            let cache = Arc::clone(&cache);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let _permit = permit;
                run_group_once(&group, &geocoder, &cache, store.as_ref(), params).await;
            });
        }
    })
}

/// Spawn the ambient weather poller (dashboard header snapshot).
pub fn spawn_weather_poller(
    config: Arc<MonitorConfig>,
    client: reqwest::Client,
    cache: Arc<WeatherCache>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(api_key) = config.openweather_api_key.clone() else {
            tracing::warn!("OPENWEATHER_API_KEY not set, weather snapshot disabled");
            return;
        };
        let interval = config.weather_poll_interval;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            cache.set_next_poll(
                Utc::now() + chrono::Duration::from_std(interval).unwrap_or_default(),
                interval,
            );
            match openweather::fetch_snapshot(&client, &api_key).await {
                Ok(snapshot) => {
                    counter!("weather_polls_total", "status" => "ok").increment(1);
                    cache.set_snapshot(snapshot);
                }
                Err(err) => {
                    counter!("weather_polls_total", "status" => "error").increment(1);
                    tracing::warn!(error = %err, "weather poll failed");
                    cache.set_error(&err.to_string());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_allows_one_permit_at_a_time() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire().expect("first permit");
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn permit_denies_while_a_task_holds_it() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire().expect("first permit");

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (finish_tx, finish_rx) = tokio::sync::oneshot::channel::<()>();
        let worker = tokio::spawn(async move {
            let _permit = permit;
            started_tx.send(()).ok();
            finish_rx.await.ok();
        });

        started_rx.await.expect("worker started");
        // The run is in flight on another task; a new tick must be denied.
        assert!(guard.try_acquire().is_none());

        finish_tx.send(()).ok();
        worker.await.expect("worker finished");
        assert!(guard.try_acquire().is_some());
    }
}

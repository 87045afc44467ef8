//! Attica incident monitor — binary entrypoint.
//! Boots the polling groups, the weather poller and the Axum HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use attica_monitor::api::{create_router, AppState};
use attica_monitor::cache::{IncidentCache, WeatherCache};
use attica_monitor::config::{self, MonitorConfig};
use attica_monitor::geocode::Geocoder;
use attica_monitor::ingest::providers::{
    gdelt::GdeltProvider, meteo::MeteoProvider, usgs::UsgsProvider,
};
use attica_monitor::ingest::scheduler::{spawn_poll_group, spawn_weather_poller, PollGroup};
use attica_monitor::ingest::types::SourceProvider;
use attica_monitor::ingest::PipelineParams;
use attica_monitor::metrics::Metrics;
use attica_monitor::store::{IncidentStore, MemoryStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("attica_monitor=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Arc::new(MonitorConfig::from_env());
    let metrics = Metrics::init();

    let client = reqwest::Client::builder()
        .timeout(config::FETCH_TIMEOUT)
        .user_agent(concat!("attica-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;

    let geocoder = Arc::new(Geocoder::new(config.nominatim_contact.clone()));
    let incident_cache = Arc::new(IncidentCache::new());
    let weather_cache = Arc::new(WeatherCache::new());
    let store: Arc<dyn IncidentStore> = Arc::new(MemoryStore::new());

    let params = PipelineParams {
        window_minutes: config::DEFAULT_WINDOW_MINUTES,
        limit: config::DEFAULT_LIMIT,
    };

    let news_group = PollGroup {
        name: "news",
        interval: config.news_poll_interval,
        providers: vec![
            Arc::new(GdeltProvider::new(client.clone())) as Arc<dyn SourceProvider>,
            Arc::new(MeteoProvider::new(client.clone())),
        ],
    };
    let seismic_group = PollGroup {
        name: "seismic",
        interval: config.seismic_poll_interval,
        providers: vec![Arc::new(UsgsProvider::new(client.clone())) as Arc<dyn SourceProvider>],
    };

    spawn_poll_group(
        news_group,
        Arc::clone(&geocoder),
        Arc::clone(&incident_cache),
        Arc::clone(&store),
        params,
    );
    spawn_poll_group(
        seismic_group,
        Arc::clone(&geocoder),
        Arc::clone(&incident_cache),
        Arc::clone(&store),
        params,
    );
    spawn_weather_poller(Arc::clone(&config), client.clone(), Arc::clone(&weather_cache));

    let state = AppState {
        incidents: incident_cache,
        weather: weather_cache,
        store,
    };
    let router = create_router(state).merge(metrics.router());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "attica monitor listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}

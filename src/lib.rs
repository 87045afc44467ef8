// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod filter;
pub mod geocode;
pub mod ingest;
pub mod metrics;
pub mod region;
pub mod similarity;
pub mod store;

pub use crate::api::{create_router, AppState};

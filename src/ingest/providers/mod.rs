// src/ingest/providers/mod.rs
pub mod gdelt;
pub mod meteo;
pub mod openweather;
pub mod usgs;

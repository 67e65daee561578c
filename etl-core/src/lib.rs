//! Core library for the weather ETL pipeline.
//!
//! This crate defines:
//! - Configuration resolution (variables, connection record, trigger payload)
//! - The fetcher (OpenWeather current-weather adapter)
//! - The publisher (CSV objects staged into object storage)
//! - The warehouse loader (bulk COPY with per-row error tolerance)
//! - The dashboard query surface (fixed query, TTL result cache)
//!
//! It is used by `etl-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod dashboard;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod record;
pub mod store;
pub mod warehouse;

pub use config::{FALLBACK_CITY, RunConfig, Settings, StorageConfig, TriggerPayload};
pub use dashboard::{Dashboard, DashboardView};
pub use fetch::Fetcher;
pub use pipeline::{Pipeline, PipelineOutcome, extract_and_publish};
pub use record::WeatherRecord;
pub use store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use warehouse::{LoadReport, Warehouse};

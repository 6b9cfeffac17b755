//! restoquery core - k-nearest restaurant queries with a result cache
//!
//! This crate provides:
//! - Geographic types and haversine distance
//! - Document store access (SQLite and in-memory)
//! - Candidate scanning, ranking and the query engine
//! - A bounded result cache with tolerance lookup and full-flush eviction
//! - Cache backends (JSON file, SQLite table)
//! - Bulk import and configuration

pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod import;
pub mod ranker;
pub mod scanner;
pub mod schema;
pub mod store;
pub mod types;

pub use backends::{FileBackend, TableBackend};
pub use cache::{CacheBackend, CacheEntry, CacheWrite, MemoryBackend, ResultCache};
pub use config::{CacheBackendKind, Config};
pub use engine::{CuisineFallback, QueryEngine, QueryOutcome, QueryPlan, SearchRequest};
pub use error::{Error, Result};
pub use geo::haversine_km;
pub use import::{import_str, ImportReport};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use types::*;

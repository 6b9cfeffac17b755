//! Configuration
//!
//! Read from `~/.restoquery/config.toml`. Every section and key is optional;
//! a missing file means defaults throughout.
//!
//! ```toml
//! [store]
//! path = "/data/restaurants.db"
//!
//! [cache]
//! backend = "table"   # or "file"
//! capacity = 20
//! tolerance = 0.001
//!
//! [query]
//! k = 5
//! fallback_k = 3
//!
//! [input]
//! lat_min = 40.50
//! lat_max = 41.20
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TOLERANCE};
use crate::engine::CuisineFallback;
use crate::error::{Error, Result};

/// Default number of results per query
const DEFAULT_K: usize = 5;
/// Result count used when an unknown cuisine is dropped
const DEFAULT_FALLBACK_K: usize = 3;

/// Resolve the restoquery home directory (`~/.restoquery`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".restoquery"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.restoquery"))
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub input: InputConfig,
}

/// Document store location
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database path (default: `<home>/restaurants.db`)
    pub path: Option<PathBuf>,
}

/// Which durable storage the result cache uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    File,
    Table,
}

/// Result cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    /// Cache file for the file backend, or database for the table backend.
    /// Defaults to `<home>/cache.json` or the store database respectively.
    pub path: Option<PathBuf>,
    pub capacity: usize,
    pub tolerance: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            path: None,
            capacity: DEFAULT_CAPACITY,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub k: usize,
    /// Result count for the unfiltered retry when a cuisine is unknown.
    /// Set to 0 to keep the unknown filter instead.
    pub fallback_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            fallback_k: DEFAULT_FALLBACK_K,
        }
    }
}

impl QueryConfig {
    pub fn fallback(&self) -> CuisineFallback {
        match self.fallback_k {
            0 => CuisineFallback::Keep,
            k => CuisineFallback::Unfiltered { k },
        }
    }
}

/// Accepted coordinate ranges for interactive input (New York City by default)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            lat_min: 40.50,
            lat_max: 41.20,
            lon_min: -74.26,
            lon_max: -73.20,
        }
    }
}

impl Config {
    /// Load `config.toml` from `home`, falling back to defaults if it is absent.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join("config.toml");
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.query.k == 0 {
            return Err(Error::Config("query.k must be positive".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be positive".to_string()));
        }
        if !self.cache.tolerance.is_finite() || self.cache.tolerance < 0.0 {
            return Err(Error::Config(
                "cache.tolerance must be a non-negative number".to_string(),
            ));
        }
        let input = &self.input;
        if !(input.lat_min <= input.lat_max && input.lon_min <= input.lon_max) {
            return Err(Error::Config("input ranges must have min <= max".to_string()));
        }
        Ok(())
    }

    pub fn store_path(&self, home: &Path) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| home.join("restaurants.db"))
    }

    pub fn cache_path(&self, home: &Path) -> PathBuf {
        match (&self.cache.path, self.cache.backend) {
            (Some(path), _) => path.clone(),
            (None, CacheBackendKind::File) => home.join("cache.json"),
            (None, CacheBackendKind::Table) => self.store_path(home),
        }
    }
}

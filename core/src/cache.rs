//! Result cache with tolerance-based lookup and full-flush eviction
//!
//! Entries live in a plain ordered `Vec` and are matched with a linear scan:
//! keys are compared with a coordinate tolerance, so hashing does not apply.
//! When the cache is full the next store drops every entry before appending.
//! There is no recency or frequency tracking.
//!
//! The cache loads its backend lazily on first use and persists after every
//! write. A corrupt backend reads as an empty cache.

use std::cell::{Cell, RefCell};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{QueryParameters, RankedResult};

/// Maximum number of entries held before a full flush.
pub const DEFAULT_CAPACITY: usize = 20;

/// Coordinate tolerance, in degrees, for treating two queries as equivalent.
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// One cached query and its ranked answer.
///
/// # Fields
/// - `seq`: Insertion order, increasing within a cache's lifetime.
/// - `params`: Parameters the results were computed for.
/// - `results`: Ranked results, served verbatim on a hit.
/// - `created_at`: When the entry was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub seq: u64,
    pub params: QueryParameters,
    pub results: Vec<RankedResult>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Same `k`, same cuisine filter, and both coordinates within `tolerance`.
    pub fn matches(&self, params: &QueryParameters, tolerance: f64) -> bool {
        let stored = self.params.point();
        let queried = params.point();

        self.params.k() == params.k()
            && self.params.cuisine() == params.cuisine()
            && (stored.latitude() - queried.latitude()).abs() <= tolerance
            && (stored.longitude() - queried.longitude()).abs() <= tolerance
    }
}

/// State handed to a backend after each write.
///
/// `entries` is the complete cache after the write; the newly stored entry, if
/// any, is last. `flushed` is set when the backend must discard everything it
/// holds before persisting `entries`: the cache was full, or the stored data was
/// unreadable.
#[derive(Debug, Clone, Copy)]
pub struct CacheWrite<'a> {
    pub entries: &'a [CacheEntry],
    pub flushed: bool,
}

impl<'a> CacheWrite<'a> {
    pub fn newest(&self) -> Option<&'a CacheEntry> {
        self.entries.last()
    }
}

/// Durable storage for the result cache.
pub trait CacheBackend {
    /// Load every persisted entry in storage order.
    ///
    /// Returns `Error::Corrupt` when the stored data cannot be decoded.
    fn load(&self) -> Result<Vec<CacheEntry>>;

    /// Persist the cache state after a write.
    fn save(&self, write: CacheWrite<'_>) -> Result<()>;
}

impl<B: CacheBackend + ?Sized> CacheBackend for Box<B> {
    fn load(&self) -> Result<Vec<CacheEntry>> {
        (**self).load()
    }

    fn save(&self, write: CacheWrite<'_>) -> Result<()> {
        (**self).save(write)
    }
}

/// Backend that keeps entries in memory only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<Vec<CacheEntry>>,
    saves: Cell<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: RefCell::new(entries),
            saves: Cell::new(0),
        }
    }

    /// Entries as last persisted.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries.borrow().clone()
    }

    /// Number of saves performed.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.borrow().clone())
    }

    fn save(&self, write: CacheWrite<'_>) -> Result<()> {
        *self.entries.borrow_mut() = write.entries.to_vec();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

/// Bounded result cache over a durable backend.
pub struct ResultCache<B> {
    backend: B,
    capacity: usize,
    tolerance: f64,
    entries: Vec<CacheEntry>,
    loaded: bool,
    // Set when storage was unreadable; the next save must replace it whole.
    rewrite: bool,
}

impl<B: CacheBackend> ResultCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            capacity: DEFAULT_CAPACITY,
            tolerance: DEFAULT_TOLERANCE,
            entries: Vec::new(),
            loaded: false,
            rewrite: false,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.abs();
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of entries currently held.
    pub fn len(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.entries.len())
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries in storage order.
    pub fn entries(&mut self) -> Result<&[CacheEntry]> {
        self.ensure_loaded()?;
        Ok(self.entries.as_slice())
    }

    /// Return the results of the first entry matching `params`, if any.
    pub fn lookup(&mut self, params: &QueryParameters) -> Result<Option<Vec<RankedResult>>> {
        self.ensure_loaded()?;

        let tolerance = self.tolerance;
        let hit = self
            .entries
            .iter()
            .find(|entry| entry.matches(params, tolerance))
            .map(|entry| {
                debug!("Cache hit on entry {}", entry.seq);
                entry.results.clone()
            });

        Ok(hit)
    }

    /// Append an entry, flushing everything first when the cache is full.
    ///
    /// The in-memory state only changes if the backend accepts the write.
    pub fn store(&mut self, params: QueryParameters, results: Vec<RankedResult>) -> Result<()> {
        self.ensure_loaded()?;

        let seq = self.entries.last().map_or(0, |entry| entry.seq + 1);
        let full = self.entries.len() >= self.capacity;
        let flushed = full || self.rewrite;
        let previous = if flushed {
            std::mem::take(&mut self.entries)
        } else {
            Vec::new()
        };

        self.entries.push(CacheEntry {
            seq,
            params,
            results,
            created_at: Utc::now(),
        });

        let write = CacheWrite {
            entries: &self.entries,
            flushed,
        };
        if let Err(e) = self.backend.save(write) {
            self.entries.pop();
            if flushed {
                self.entries = previous;
            }
            return Err(e);
        }

        self.rewrite = false;
        if full {
            info!(
                "Cache reached capacity {}; flushed {} entries",
                self.capacity,
                previous.len()
            );
        }
        debug!("Stored cache entry {} ({} entries)", seq, self.entries.len());
        Ok(())
    }

    /// Drop every entry and persist the empty cache.
    pub fn clear(&mut self) -> Result<usize> {
        self.ensure_loaded()?;
        self.backend.save(CacheWrite {
            entries: &[],
            flushed: true,
        })?;
        self.rewrite = false;
        let dropped = self.entries.len();
        self.entries.clear();
        Ok(dropped)
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        self.entries = match self.backend.load() {
            Ok(entries) => {
                debug!("Loaded {} cache entries", entries.len());
                entries
            }
            Err(Error::Corrupt(reason)) => {
                warn!("Cache storage is corrupt, starting empty: {}", reason);
                self.rewrite = true;
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        self.loaded = true;
        Ok(())
    }
}

//! Query orchestration
//!
//! Every query goes through the cache first:
//!
//! ```text
//! START -> CACHE_LOOKUP -> CACHE_HIT  -> DONE
//!                       -> CACHE_MISS -> SCAN -> RANK -> CACHE_STORE -> DONE
//! ```
//!
//! A hit never touches the document store. On a miss the scan and ranking run
//! to completion before anything is written, so a failed scan leaves the cache
//! untouched and returns no results.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cache::{CacheBackend, ResultCache};
use crate::error::Result;
use crate::ranker::rank;
use crate::scanner::scan_candidates;
use crate::store::DocumentStore;
use crate::types::{GeoPoint, QueryParameters, RankedResult, ResultSource};

/// What to do when the requested cuisine does not exist in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuisineFallback {
    /// Keep the filter; the query returns no results.
    Keep,
    /// Drop the filter and search all cuisines with this result count instead.
    Unfiltered { k: usize },
}

/// A user request before cuisine resolution.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub point: GeoPoint,
    pub k: usize,
    pub cuisine: Option<String>,
    pub fallback: CuisineFallback,
}

/// Resolved parameters for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub params: QueryParameters,
    /// Set when the requested cuisine was unknown and the filter was dropped.
    pub fell_back: bool,
}

/// Result of a single query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub params: QueryParameters,
    pub results: Vec<RankedResult>,
    pub source: ResultSource,
    pub elapsed: Duration,
}

/// Explicit query context: the document store and the result cache.
pub struct QueryEngine<S, B> {
    store: S,
    cache: ResultCache<B>,
}

impl<S: DocumentStore, B: CacheBackend> QueryEngine<S, B> {
    pub fn new(store: S, cache: ResultCache<B>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&mut self) -> &mut ResultCache<B> {
        &mut self.cache
    }

    /// Resolve a request into query parameters, applying the cuisine fallback.
    pub fn plan(&self, request: SearchRequest) -> Result<QueryPlan> {
        let params = QueryParameters::new(request.point, request.k, request.cuisine)?;

        let Some(cuisine) = params.cuisine() else {
            return Ok(QueryPlan {
                params,
                fell_back: false,
            });
        };

        if self.store.has_cuisine(cuisine)? {
            return Ok(QueryPlan {
                params,
                fell_back: false,
            });
        }

        match request.fallback {
            CuisineFallback::Keep => {
                warn!("Cuisine '{}' not found; keeping the filter", cuisine);
                Ok(QueryPlan {
                    params,
                    fell_back: false,
                })
            }
            CuisineFallback::Unfiltered { k } => {
                warn!(
                    "Cuisine '{}' not found; searching all cuisines with k={}",
                    cuisine, k
                );
                Ok(QueryPlan {
                    params: QueryParameters::new(params.point(), k, None)?,
                    fell_back: true,
                })
            }
        }
    }

    /// Answer a query from the cache, or scan, rank and cache on a miss.
    pub fn run(&mut self, params: &QueryParameters) -> Result<QueryOutcome> {
        let started = Instant::now();

        if let Some(results) = self.cache.lookup(params)? {
            let elapsed = started.elapsed();
            info!(
                "Served {} results from cache in {:.2?}",
                results.len(),
                elapsed
            );
            return Ok(QueryOutcome {
                params: params.clone(),
                results,
                source: ResultSource::Cache,
                elapsed,
            });
        }

        debug!("Cache miss for k={} cuisine={:?}", params.k(), params.cuisine());
        let candidates = scan_candidates(&self.store, params.point(), params.cuisine())?;
        let results = rank(candidates, params.k());
        self.cache.store(params.clone(), results.clone())?;

        let elapsed = started.elapsed();
        info!(
            "Served {} results from live scan in {:.2?}",
            results.len(),
            elapsed
        );
        Ok(QueryOutcome {
            params: params.clone(),
            results,
            source: ResultSource::Live,
            elapsed,
        })
    }

    /// Plan and run a request in one step.
    pub fn search(&mut self, request: SearchRequest) -> Result<(QueryPlan, QueryOutcome)> {
        let plan = self.plan(request)?;
        let outcome = self.run(&plan.params)?;
        Ok((plan, outcome))
    }
}

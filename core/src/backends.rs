//! Durable cache backends
//!
//! - `FileBackend`: the whole cache as one JSON array, rewritten on every save
//! - `TableBackend`: one row per entry in the `query_cache` SQLite table

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::cache::{CacheBackend, CacheEntry, CacheWrite};
use crate::error::{Error, Result};
use crate::schema::init_schema;
use crate::types::{GeoPoint, QueryParameters, RankedResult};

/// Cache persisted as a flat JSON list of entries.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CacheBackend for FileBackend {
    fn load(&self) -> Result<Vec<CacheEntry>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&content)
            .map_err(|e| Error::Corrupt(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, write: CacheWrite<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(write.entries)?)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Wrote {} cache entries to {}",
            write.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Cache persisted as rows of the `query_cache` table.
pub struct TableBackend {
    conn: Connection,
}

impl TableBackend {
    /// Open or create the cache table in the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw row as stored, before validation.
struct CacheRow {
    seq: i64,
    latitude: f64,
    longitude: f64,
    k: i64,
    cuisine_filter: Option<String>,
    results: String,
    created_at: String,
}

impl CacheRow {
    fn into_entry(self) -> Result<CacheEntry> {
        let corrupt = |what: String| Error::Corrupt(format!("query_cache row {}: {}", self.seq, what));

        let point = GeoPoint::new(self.latitude, self.longitude).map_err(|e| corrupt(e.to_string()))?;
        let k = usize::try_from(self.k).map_err(|_| corrupt(format!("invalid k {}", self.k)))?;
        let params = QueryParameters::new(point, k, self.cuisine_filter.clone())
            .map_err(|e| corrupt(e.to_string()))?;
        let results: Vec<RankedResult> =
            serde_json::from_str(&self.results).map_err(|e| corrupt(e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);
        let seq = u64::try_from(self.seq).map_err(|_| corrupt("negative seq".to_string()))?;

        Ok(CacheEntry {
            seq,
            params,
            results,
            created_at,
        })
    }
}

impl CacheBackend for TableBackend {
    fn load(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, latitude, longitude, k, cuisine_filter, results, created_at
             FROM query_cache ORDER BY seq",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CacheRow {
                    seq: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    k: row.get(3)?,
                    cuisine_filter: row.get(4)?,
                    results: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| match e {
                rusqlite::Error::FromSqlConversionFailure(..)
                | rusqlite::Error::InvalidColumnType(..) => Error::Corrupt(e.to_string()),
                other => Error::Database(other),
            })?;

        rows.into_iter().map(CacheRow::into_entry).collect()
    }

    fn save(&self, write: CacheWrite<'_>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if write.flushed {
            tx.execute("DELETE FROM query_cache", [])?;
        }

        if let Some(entry) = write.newest() {
            let point = entry.params.point();
            tx.execute(
                "INSERT OR REPLACE INTO query_cache
                    (seq, latitude, longitude, k, cuisine_filter, results, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.seq as i64,
                    point.latitude(),
                    point.longitude(),
                    entry.params.k() as i64,
                    entry.params.cuisine(),
                    serde_json::to_string(&entry.results)?,
                    entry.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;

    fn params(lat: f64, lon: f64, cuisine: Option<&str>) -> QueryParameters {
        QueryParameters::new(
            GeoPoint::new(lat, lon).unwrap(),
            5,
            cuisine.map(str::to_string),
        )
        .unwrap()
    }

    fn results(name: &str) -> Vec<RankedResult> {
        vec![
            RankedResult {
                name: name.to_string(),
                distance_km: 0.25,
                cuisine: "Bakery".to_string(),
            },
            RankedResult {
                name: format!("{name} II"),
                distance_km: 1.5,
                cuisine: "Bakery".to_string(),
            },
        ]
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ResultCache::new(FileBackend::new(&path));
        cache
            .store(params(40.70, -73.99, Some("Bakery")), results("Crumbs"))
            .unwrap();

        let mut reopened = ResultCache::new(FileBackend::new(&path));
        assert_eq!(
            reopened
                .lookup(&params(40.7002, -73.9901, Some("Bakery")))
                .unwrap(),
            Some(results("Crumbs"))
        );
    }

    #[test]
    fn test_file_backend_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("cache.json"));
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_corrupt_file_reads_as_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "[{\"seq\": oops").unwrap();

        assert!(matches!(
            FileBackend::new(&path).load(),
            Err(Error::Corrupt(_))
        ));

        let mut cache = ResultCache::new(FileBackend::new(&path));
        assert!(cache.lookup(&params(40.70, -73.99, None)).unwrap().is_none());

        // The next store replaces the corrupt file wholesale.
        cache.store(params(40.70, -73.99, None), results("A")).unwrap();
        assert_eq!(FileBackend::new(&path).load().unwrap().len(), 1);
    }

    #[test]
    fn test_file_backend_non_utf8_file_reads_as_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        assert!(matches!(
            FileBackend::new(&path).load(),
            Err(Error::Corrupt(_))
        ));

        let mut cache = ResultCache::new(FileBackend::new(&path));
        assert!(cache.lookup(&params(40.70, -73.99, None)).unwrap().is_none());
        cache.store(params(40.70, -73.99, None), results("A")).unwrap();
        assert_eq!(FileBackend::new(&path).load().unwrap().len(), 1);
    }

    #[test]
    fn test_file_backend_rewrites_full_state_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ResultCache::new(FileBackend::new(&path)).with_capacity(2);
        cache.store(params(40.5, -73.9, None), results("a")).unwrap();
        cache.store(params(40.6, -73.9, None), results("b")).unwrap();
        assert_eq!(FileBackend::new(&path).load().unwrap().len(), 2);

        cache.store(params(40.7, -73.9, None), results("c")).unwrap();
        let persisted = FileBackend::new(&path).load().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].results, results("c"));
    }

    #[test]
    fn test_table_backend_flush_then_append() {
        let backend = TableBackend::open_in_memory().unwrap();
        let mut cache = ResultCache::new(backend).with_capacity(2);

        cache.store(params(40.5, -73.9, Some("Bakery")), results("a")).unwrap();
        cache.store(params(40.6, -73.9, None), results("b")).unwrap();
        assert_eq!(cache.backend().load().unwrap().len(), 2);

        cache.store(params(40.7, -73.9, None), results("c")).unwrap();
        let rows = cache.backend().load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].params, params(40.7, -73.9, None));
        assert_eq!(rows[0].results, results("c"));
    }

    #[test]
    fn test_table_backend_round_trips_entry_fields() {
        let backend = TableBackend::open_in_memory().unwrap();
        let mut cache = ResultCache::new(backend);
        cache
            .store(params(40.70, -73.99, Some("Bakery")), results("Crumbs"))
            .unwrap();

        let rows = cache.backend().load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].params.cuisine(), Some("Bakery"));
        assert_eq!(rows[0].params.k(), 5);
        assert_eq!(rows[0].results, results("Crumbs"));
    }

    #[test]
    fn test_table_backend_bad_results_are_corrupt() {
        let backend = TableBackend::open_in_memory().unwrap();
        backend
            .conn
            .execute(
                "INSERT INTO query_cache (seq, latitude, longitude, k, cuisine_filter, results, created_at)
                 VALUES (0, 40.7, -73.99, 5, NULL, 'not json', '2026-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();

        assert!(matches!(backend.load(), Err(Error::Corrupt(_))));

        let mut cache = ResultCache::new(backend);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_table_backend_recovers_from_corrupt_rows_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let backend = TableBackend::open(&path).unwrap();
        backend
            .conn
            .execute(
                "INSERT INTO query_cache (seq, latitude, longitude, k, cuisine_filter, results, created_at)
                 VALUES (99, 40.7, -73.99, 5, NULL, 'not json', '2026-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();

        let mut cache = ResultCache::new(backend);
        let p = params(40.60, -73.95, None);
        assert!(cache.lookup(&p).unwrap().is_none());
        cache.store(p.clone(), results("fresh")).unwrap();
        assert_eq!(cache.lookup(&p).unwrap(), Some(results("fresh")));
        drop(cache);

        let reopened = TableBackend::open(&path).unwrap();
        let rows = reopened.load().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].results, results("fresh"));

        let mut cache = ResultCache::new(reopened);
        assert_eq!(cache.lookup(&p).unwrap(), Some(results("fresh")));
    }
}

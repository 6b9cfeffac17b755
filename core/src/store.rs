//! Document store access
//!
//! The scanner only needs a single streaming pass over restaurant projections,
//! so stores expose a visitor rather than materializing the collection.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::scanner::cuisine_matches;
use crate::schema::init_schema;
use crate::types::{RecordId, RestaurantRecord};

/// How long SQLite waits on a locked database before failing the read.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read side of the restaurant document store.
pub trait DocumentStore {
    /// Stream every record projection once, in storage order.
    ///
    /// `cuisine` may be pushed down as a case-insensitive equality filter; callers
    /// must not rely on it being applied. Unparseable documents are skipped.
    fn scan(&self, cuisine: Option<&str>, visit: &mut dyn FnMut(RestaurantRecord)) -> Result<()>;

    /// Whether any record carries this cuisine (case-insensitive).
    fn has_cuisine(&self, cuisine: &str) -> Result<bool>;

    /// Number of stored documents.
    fn count(&self) -> Result<u64>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn scan(&self, cuisine: Option<&str>, visit: &mut dyn FnMut(RestaurantRecord)) -> Result<()> {
        (**self).scan(cuisine, visit)
    }

    fn has_cuisine(&self, cuisine: &str) -> Result<bool> {
        (**self).has_cuisine(cuisine)
    }

    fn count(&self) -> Result<u64> {
        (**self).count()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn scan(&self, cuisine: Option<&str>, visit: &mut dyn FnMut(RestaurantRecord)) -> Result<()> {
        (**self).scan(cuisine, visit)
    }

    fn has_cuisine(&self, cuisine: &str) -> Result<bool> {
        (**self).has_cuisine(cuisine)
    }

    fn count(&self) -> Result<u64> {
        (**self).count()
    }
}

/// SQLite-backed document store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Insert or update documents keyed by restaurant id, in one transaction.
    ///
    /// Returns the number of rows written.
    pub fn upsert_documents(&mut self, docs: &[(RecordId, Value)]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO restaurants (restaurant_id, name, cuisine, borough, document, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(restaurant_id) DO UPDATE SET
                    name = excluded.name,
                    cuisine = excluded.cuisine,
                    borough = excluded.borough,
                    document = excluded.document,
                    updated_at = excluded.updated_at",
            )?;
            for (id, doc) in docs {
                let field = |key: &str| doc.get(key).and_then(Value::as_str).map(str::to_owned);
                written += stmt.execute(params![
                    id.as_key(),
                    field("name"),
                    field("cuisine"),
                    field("borough"),
                    doc.to_string(),
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Distinct cuisines with their record counts, most common first.
    pub fn cuisines(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT cuisine, COUNT(*) AS n FROM restaurants
             WHERE cuisine IS NOT NULL
             GROUP BY cuisine ORDER BY n DESC, cuisine",
        )?;
        let cuisines = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cuisines)
    }
}

/// Filter that SQLite can apply itself. `COLLATE NOCASE` only folds ASCII,
/// so anything else is left to the scanner.
fn pushdown(cuisine: Option<&str>) -> Option<&str> {
    cuisine.filter(|c| c.is_ascii())
}

impl DocumentStore for SqliteStore {
    fn scan(&self, cuisine: Option<&str>, visit: &mut dyn FnMut(RestaurantRecord)) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT document FROM restaurants
             WHERE ?1 IS NULL OR cuisine = ?1 COLLATE NOCASE
             ORDER BY id",
        )?;
        let mut rows = stmt.query(params![pushdown(cuisine)])?;

        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(doc) => visit(RestaurantRecord::from_document(&doc)),
                Err(e) => debug!("Skipping malformed document: {}", e),
            }
        }

        Ok(())
    }

    fn has_cuisine(&self, cuisine: &str) -> Result<bool> {
        if let Some(filter) = pushdown(Some(cuisine)) {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM restaurants WHERE cuisine = ?1 COLLATE NOCASE)",
                [filter],
                |row| row.get(0),
            )?;
            return Ok(exists);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT cuisine FROM restaurants WHERE cuisine IS NOT NULL")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let stored: String = row.get(0)?;
            if cuisine_matches(&stored, cuisine) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM restaurants", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// In-memory document store, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Vec<Value>,
}

impl MemoryStore {
    pub fn new(documents: Vec<Value>) -> Self {
        Self { documents }
    }
}

impl DocumentStore for MemoryStore {
    fn scan(&self, _cuisine: Option<&str>, visit: &mut dyn FnMut(RestaurantRecord)) -> Result<()> {
        for doc in &self.documents {
            visit(RestaurantRecord::from_document(doc));
        }
        Ok(())
    }

    fn has_cuisine(&self, cuisine: &str) -> Result<bool> {
        Ok(self
            .documents
            .iter()
            .filter_map(|doc| doc.get("cuisine").and_then(Value::as_str))
            .any(|c| cuisine_matches(c, cuisine)))
    }

    fn count(&self) -> Result<u64> {
        Ok(self.documents.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan_candidates;
    use crate::types::GeoPoint;
    use serde_json::json;

    fn doc(id: &str, name: &str, cuisine: &str, lon: f64, lat: f64) -> (RecordId, Value) {
        (
            RecordId::Text(id.to_string()),
            json!({
                "restaurant_id": id,
                "name": name,
                "cuisine": cuisine,
                "borough": "Manhattan",
                "address": {"coord": {"type": "Point", "coordinates": [lon, lat]}}
            }),
        )
    }

    fn names(store: &dyn DocumentStore, cuisine: Option<&str>) -> Vec<String> {
        let mut seen = Vec::new();
        store
            .scan(cuisine, &mut |record| seen.push(record.display_name().to_string()))
            .unwrap();
        seen
    }

    #[test]
    fn test_upsert_and_scan() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let written = store
            .upsert_documents(&[
                doc("1", "Luigi's", "Italian", -73.99, 40.70),
                doc("2", "Golden Wok", "Chinese", -73.98, 40.71),
            ])
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(names(&store, None), vec!["Luigi's", "Golden Wok"]);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_documents(&[doc("1", "Old Name", "Italian", -73.99, 40.70)])
            .unwrap();
        store
            .upsert_documents(&[doc("1", "New Name", "Italian", -73.99, 40.70)])
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(names(&store, None), vec!["New Name"]);
    }

    #[test]
    fn test_cuisine_pushdown_is_case_insensitive() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_documents(&[
                doc("1", "Luigi's", "Italian", -73.99, 40.70),
                doc("2", "Golden Wok", "Chinese", -73.98, 40.71),
            ])
            .unwrap();

        assert_eq!(names(&store, Some("italian")), vec!["Luigi's"]);
        assert!(store.has_cuisine("CHINESE").unwrap());
        assert!(!store.has_cuisine("Thai").unwrap());
    }

    #[test]
    fn test_non_ascii_cuisine_matches_ignoring_case() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_documents(&[
                doc("1", "Café Grumpy", "Café/Coffee/Tea", -73.99, 40.70),
                doc("2", "Golden Wok", "Chinese", -73.98, 40.71),
            ])
            .unwrap();

        assert!(store.has_cuisine("CAFÉ/COFFEE/TEA").unwrap());
        assert!(!store.has_cuisine("CAFÉ").unwrap());

        let user = GeoPoint::new(40.70, -73.99).unwrap();
        let matched = scan_candidates(&store, user, Some("CAFÉ/COFFEE/TEA")).unwrap();
        let names: Vec<_> = matched.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Café Grumpy"]);
    }

    #[test]
    fn test_scan_skips_unparseable_documents() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_documents(&[doc("1", "Luigi's", "Italian", -73.99, 40.70)])
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO restaurants (restaurant_id, document, updated_at) VALUES ('2', '{broken', '')",
                [],
            )
            .unwrap();

        assert_eq!(names(&store, None), vec!["Luigi's"]);
    }

    #[test]
    fn test_cuisines_ranked_by_count() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_documents(&[
                doc("1", "A", "Italian", -73.99, 40.70),
                doc("2", "B", "Chinese", -73.98, 40.71),
                doc("3", "C", "Italian", -73.97, 40.72),
            ])
            .unwrap();

        let cuisines = store.cuisines().unwrap();
        assert_eq!(cuisines[0], ("Italian".to_string(), 2));
        assert_eq!(cuisines[1], ("Chinese".to_string(), 1));
    }

    #[test]
    fn test_memory_store_has_cuisine() {
        let store = MemoryStore::new(vec![json!({"name": "A", "cuisine": "Café"})]);
        assert!(store.has_cuisine("CAFÉ").unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }
}

//! Database schema and migrations for restoquery
//!
//! Manages the SQLite database with:
//! - restaurants: restaurant documents keyed by a unique restaurant id
//! - query_cache: table-backed storage for the result cache

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize or migrate the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// V1: restaurant documents. The unique constraint on restaurant_id exists
/// before the first write so imports can upsert against it.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS restaurants (
            id INTEGER PRIMARY KEY,
            restaurant_id TEXT NOT NULL UNIQUE,
            name TEXT,
            cuisine TEXT,
            borough TEXT,
            document TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_restaurants_cuisine ON restaurants(cuisine COLLATE NOCASE);",
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}

/// V2: table-backed result cache
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS query_cache (
            seq INTEGER PRIMARY KEY,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            k INTEGER NOT NULL,
            cuisine_filter TEXT,
            results TEXT NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;

    set_schema_version(conn, 2)?;
    Ok(())
}

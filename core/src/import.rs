//! Bulk import of restaurant documents
//!
//! Accepts a JSON array or JSON lines (one document per line, as produced by
//! `mongoexport`). Documents are upserted by `restaurant_id`, so re-running an
//! import is idempotent. After loading, the store's row count is compared with
//! the number of distinct ids read.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::{DocumentStore, SqliteStore};
use crate::types::RecordId;

/// Documents written per transaction
const BATCH_SIZE: usize = 1000;

/// Summary of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Documents parsed from the input
    pub read: usize,
    /// Rows inserted or updated
    pub upserted: usize,
    /// Lines or documents that could not be used
    pub skipped: usize,
    /// Distinct restaurant ids seen in the input
    pub distinct_ids: usize,
    /// Rows in the store after the import
    pub store_count: u64,
}

impl ImportReport {
    /// Whether the store holds exactly the distinct documents of the input.
    pub fn verified(&self) -> bool {
        self.store_count == self.distinct_ids as u64
    }
}

/// Import documents from JSON array or JSON-lines text.
pub fn import_str(store: &mut SqliteStore, content: &str) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    let documents = parse_documents(content, &mut report)?;
    import_documents(store, documents, report)
}

fn parse_documents(content: &str, report: &mut ImportReport) -> Result<Vec<Value>> {
    if content.trim_start().starts_with('[') {
        return match serde_json::from_str::<Value>(content)? {
            Value::Array(items) => Ok(items),
            _ => Err(Error::InvalidInput("expected a JSON array".to_string())),
        };
    }

    let mut documents = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!("Skipping line {}: {}", line_no + 1, e);
                report.skipped += 1;
            }
        }
    }
    Ok(documents)
}

fn import_documents(
    store: &mut SqliteStore,
    documents: Vec<Value>,
    mut report: ImportReport,
) -> Result<ImportReport> {
    let mut seen = HashSet::new();
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    for mut doc in documents {
        report.read += 1;

        let Some(id) = doc.get("restaurant_id").and_then(RecordId::from_value) else {
            warn!("Skipping document without restaurant_id");
            report.skipped += 1;
            continue;
        };

        normalize_grade_dates(&mut doc);
        seen.insert(id.as_key());
        batch.push((id, doc));

        if batch.len() == BATCH_SIZE {
            report.upserted += store.upsert_documents(&batch)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        report.upserted += store.upsert_documents(&batch)?;
    }

    report.distinct_ids = seen.len();
    report.store_count = store.count()?;

    if report.verified() {
        info!(
            "Imported {} documents; store count matches ({})",
            report.upserted, report.store_count
        );
    } else {
        warn!(
            "Store count {} does not match {} distinct input ids",
            report.store_count, report.distinct_ids
        );
    }
    Ok(report)
}

/// Rewrite `grades[].date` values to RFC 3339 strings.
///
/// Extended-JSON dates (`{"$date": millis}` or `{"$date": "..."}`) and plain
/// strings are accepted; unrecognized values are left untouched.
fn normalize_grade_dates(doc: &mut Value) {
    let Some(grades) = doc.get_mut("grades").and_then(Value::as_array_mut) else {
        return;
    };

    for grade in grades {
        let Some(date) = grade.get_mut("date") else {
            continue;
        };
        match parse_date(date) {
            Some(parsed) => *date = Value::String(parsed.to_rfc3339()),
            None => warn!("Invalid grade date: {}", date),
        }
    }
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => parse_date(map.get("$date")?),
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map(|d| d.and_utc())
            })
            .ok(),
        _ => None,
    }
}

//! Candidate scanning: cuisine filtering and distance computation over one store pass

use tracing::debug;

use crate::error::Result;
use crate::geo::haversine_km;
use crate::store::DocumentStore;
use crate::types::{GeoPoint, RankedResult, RestaurantRecord};

/// Case-insensitive cuisine comparison.
pub fn cuisine_matches(cuisine: &str, filter: &str) -> bool {
    cuisine == filter || cuisine.to_lowercase() == filter.to_lowercase()
}

/// Turn one record into a candidate, or `None` if it is filtered out.
///
/// Records without a location are dropped. With a filter, records whose cuisine
/// is absent or differs (ignoring case) are dropped.
pub fn candidate(record: &RestaurantRecord, user: GeoPoint, cuisine: Option<&str>) -> Option<RankedResult> {
    let location = record.location?;

    if let Some(filter) = cuisine {
        match record.cuisine.as_deref() {
            Some(c) if cuisine_matches(c, filter) => {}
            _ => return None,
        }
    }

    Some(RankedResult {
        name: record.display_name().to_string(),
        distance_km: haversine_km(user, location),
        cuisine: record.display_cuisine().to_string(),
    })
}

/// Scan the store once and collect candidates in encounter order.
///
/// Store failures abort the scan; nothing partial is returned.
pub fn scan_candidates<S: DocumentStore + ?Sized>(
    store: &S,
    user: GeoPoint,
    cuisine: Option<&str>,
) -> Result<Vec<RankedResult>> {
    let mut candidates = Vec::new();
    let mut skipped = 0usize;

    store.scan(cuisine, &mut |record| match candidate(&record, user, cuisine) {
        Some(c) => candidates.push(c),
        None => skipped += 1,
    })?;

    debug!(
        "Scan produced {} candidates ({} records skipped)",
        candidates.len(),
        skipped
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn user() -> GeoPoint {
        GeoPoint::new(40.70, -73.99).unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            json!({"name": "Luigi's", "cuisine": "Italian", "address": {"coord": {"coordinates": [-73.99, 40.71]}}}),
            json!({"name": "No Coords", "cuisine": "Italian", "address": {}}),
            json!({"name": "Golden Wok", "cuisine": "Chinese", "address": {"coord": {"coordinates": [-73.98, 40.70]}}}),
            json!({"cuisine": "ITALIAN", "address": {"coord": {"coordinates": [-73.95, 40.75]}}}),
            json!({"name": "Mystery", "address": {"coord": {"coordinates": [-73.99, 40.70]}}}),
        ])
    }

    #[test]
    fn test_unfiltered_scan_skips_missing_locations() {
        let candidates = scan_candidates(&store(), user(), None).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Luigi's", "Golden Wok", "Unknown", "Mystery"]);
        assert_eq!(candidates[3].cuisine, "Unknown");
        assert_eq!(candidates[3].distance_km, 0.0);
    }

    #[test]
    fn test_cuisine_filter_ignores_case() {
        let candidates = scan_candidates(&store(), user(), Some("italian")).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Luigi's", "Unknown"]);
    }

    #[test]
    fn test_absent_cuisine_never_matches_filter() {
        let candidates = scan_candidates(&store(), user(), Some("Unknown")).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_cuisine_matches_unicode() {
        assert!(cuisine_matches("Café/Coffee/Tea", "café/coffee/tea"));
        assert!(!cuisine_matches("Thai", "Thai "));
    }
}

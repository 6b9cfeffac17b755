//! Ranking of scanned candidates

use crate::types::RankedResult;

/// Sort candidates by distance ascending and keep the first `k`.
///
/// The sort is stable, so equal distances keep scan order. Fewer than `k`
/// candidates yield a shorter list.
pub fn rank(mut candidates: Vec<RankedResult>, k: usize) -> Vec<RankedResult> {
    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates.truncate(k);
    candidates
}

use std::collections::HashSet;

use crate::hit::SearchHit;

/// Drop hits whose URL was already seen, keeping first-seen order and each
/// survivor's original `rank`.
pub fn dedupe(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::with_capacity(hits.len());
    hits.into_iter()
        .filter(|hit| seen.insert(hit.url.clone()))
        .collect()
}

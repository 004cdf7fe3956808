use serde::{Deserialize, Serialize};

use crate::api::SearchQuery;

/// Deterministic identity of a search, used for cache lookup and
/// in-flight de-duplication.
///
/// Built from the normalized parameters, so `" Doli "` and `"doli"` give
/// the same key. Term and filter are length-prefixed, so a separator inside
/// either one cannot make two different searches collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchKey(String);

impl SearchKey {
    pub fn build(term: &str, filter: &str, page: u32, page_size: u32) -> Self {
        let term = term.trim().to_lowercase();
        let filter = filter.trim();
        SearchKey(format!(
            "{}:{}|{}:{}|{}|{}",
            term.len(),
            term,
            filter.len(),
            filter,
            page.max(1),
            page_size.max(1)
        ))
    }

    pub fn from_query(query: &SearchQuery) -> Self {
        Self::build(
            &query.term,
            query.filter.as_deref().unwrap_or(""),
            query.page,
            query.page_size,
        )
    }

    /// Key for a fixed-size batch (staged loads), which has no term or filter
    pub fn batch(limit: u32) -> Self {
        Self::build("", "", 1, limit)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

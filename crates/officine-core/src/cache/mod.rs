//! In-memory result caching.
//!
//! This module provides the `KeyedCache` used for search results and
//! dashboard statistics, and the `SearchKey` that identifies a search.
//! Everything lives for the session only; nothing is written to disk.
//!
//! Search caches keep entries for 15 to 30 minutes; the statistics cache
//! uses a shorter TTL (5 minutes) and is swept independently.

pub mod key;
pub mod keyed;
pub mod search;

pub use key::SearchKey;
pub use keyed::{CacheStats, KeyedCache, DEFAULT_EVICTION_BATCH};
pub use search::SearchCaches;

use crate::api::SearchResult;

/// Cache of paginated search results for one resource type
pub type SearchCache<T> = KeyedCache<SearchKey, SearchResult<T>>;

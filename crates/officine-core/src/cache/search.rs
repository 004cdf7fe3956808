use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use super::{KeyedCache, SearchCache};
use crate::config::SyncSettings;
use crate::models::{Article, Medecin, Medicament, Ordonnance};
use crate::store::Category;

/// One search cache per searchable resource.
///
/// Articles get their own TTL: stock moves faster than the doctor or
/// medication lists.
pub struct SearchCaches {
    pub articles: Mutex<SearchCache<Article>>,
    pub medicaments: Mutex<SearchCache<Medicament>>,
    pub medecins: Mutex<SearchCache<Medecin>>,
    pub ordonnances: Mutex<SearchCache<Ordonnance>>,
}

pub(crate) fn lock<T>(cache: &Mutex<T>) -> MutexGuard<'_, T> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

impl SearchCaches {
    pub fn new(settings: &SyncSettings) -> Self {
        let max = settings.cache_max_entries;
        let batch = settings.eviction_batch;
        let articles_ttl = Duration::from_millis(settings.articles_ttl_ms);
        let search_ttl = Duration::from_millis(settings.search_ttl_ms);
        Self {
            articles: Mutex::new(KeyedCache::with_eviction_batch(max, articles_ttl, batch)),
            medicaments: Mutex::new(KeyedCache::with_eviction_batch(max, search_ttl, batch)),
            medecins: Mutex::new(KeyedCache::with_eviction_batch(max, search_ttl, batch)),
            ordonnances: Mutex::new(KeyedCache::with_eviction_batch(max, search_ttl, batch)),
        }
    }

    /// Drop cached searches for one category
    pub fn invalidate(&self, category: Category) {
        match category {
            Category::Articles => lock(&self.articles).clear(),
            Category::Medicaments => lock(&self.medicaments).clear(),
            Category::Medecins => lock(&self.medecins).clear(),
            Category::Ordonnances => lock(&self.ordonnances).clear(),
            Category::Initial | Category::Familles | Category::Statistiques => return,
        }
        debug!(%category, "Search cache invalidated");
    }

    pub fn clear_all(&self) {
        lock(&self.articles).clear();
        lock(&self.medicaments).clear();
        lock(&self.medecins).clear();
        lock(&self.ordonnances).clear();
    }

    /// Remove expired entries everywhere, returning how many were dropped
    pub fn sweep_all(&self) -> usize {
        lock(&self.articles).sweep()
            + lock(&self.medicaments).sweep()
            + lock(&self.medecins).sweep()
            + lock(&self.ordonnances).sweep()
    }

    pub fn len(&self) -> usize {
        lock(&self.articles).len()
            + lock(&self.medicaments).len()
            + lock(&self.medecins).len()
            + lock(&self.ordonnances).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Pagination, SearchResult};
    use crate::cache::SearchKey;

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_only_touches_one_category() {
        let caches = SearchCaches::new(&SyncSettings::default());
        lock(&caches.medecins).set(SearchKey::batch(30), SearchResult::new(vec![], Pagination::default()));
        lock(&caches.articles).set(SearchKey::batch(20), SearchResult::new(vec![], Pagination::default()));
        assert_eq!(caches.len(), 2);

        caches.invalidate(Category::Medecins);
        assert_eq!(caches.len(), 1);
        assert!(lock(&caches.articles).has(&SearchKey::batch(20)));

        caches.invalidate(Category::Statistiques);
        assert_eq!(caches.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_articles_expire_before_other_searches() {
        let settings = SyncSettings::default();
        let caches = SearchCaches::new(&settings);
        lock(&caches.articles).set(SearchKey::batch(20), SearchResult::new(vec![], Pagination::default()));
        lock(&caches.medecins).set(SearchKey::batch(30), SearchResult::new(vec![], Pagination::default()));

        tokio::time::advance(Duration::from_millis(settings.articles_ttl_ms + 1)).await;
        assert_eq!(caches.sweep_all(), 1);
        assert!(lock(&caches.medecins).has(&SearchKey::batch(30)));
    }
}

//! The shared, read-mostly state every view renders from.
//!
//! Readers take an `Arc<StoreState>` snapshot and never see a half-applied
//! change: writers clone the state (collections are behind `Arc`, so this
//! is shallow), modify the clone and swap it in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::category::{Category, ErrorMap, LoadingFlags};
use crate::api::{Pagination, SearchQuery};
use crate::models::{Article, Famille, Medecin, Medicament, Ordonnance, Statistiques, Tracked};

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub familles: Arc<Vec<Famille>>,
    pub articles: Arc<Vec<Article>>,
    pub articles_pagination: Pagination,
    /// Query that produced `articles`, for paging
    pub articles_query: SearchQuery,
    pub medicaments: Arc<Vec<Tracked<Medicament>>>,
    pub medecins: Arc<Vec<Tracked<Medecin>>>,
    pub ordonnances: Arc<Vec<Tracked<Ordonnance>>>,
    pub statistiques: Arc<Statistiques>,
    pub loading: LoadingFlags,
    pub errors: ErrorMap,
    /// Families and the first article page have resolved. Says nothing
    /// about medications, doctors, prescriptions or statistics.
    pub initial_loaded: bool,
}

impl StoreState {
    pub fn medecin(&self, id: i64) -> Option<&Medecin> {
        self.medecins.iter().find(|m| m.id == id).map(|t| &t.item)
    }

    pub fn medicament(&self, id: i64) -> Option<&Medicament> {
        self.medicaments.iter().find(|m| m.id == id).map(|t| &t.item)
    }

    pub fn ordonnance(&self, id: i64) -> Option<&Tracked<Ordonnance>> {
        self.ordonnances.iter().find(|o| o.id == id)
    }
}

pub struct DataStore {
    state: RwLock<Arc<StoreState>>,
    /// Bumped on every reset; async writers started before a reset use it
    /// to drop their now-stale results
    generation: AtomicU64,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Arc::new(StoreState::default())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<StoreState> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply `f` to a copy of the state and publish the copy
    pub fn update<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        let mut next = guard.as_ref().clone();
        let result = f(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Like `update`, unless the store was reset since `generation` was read
    pub fn update_if(&self, generation: u64, f: impl FnOnce(&mut StoreState)) -> bool {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if self.generation() != generation {
            debug!(expected = generation, current = self.generation(), "Dropping stale store write");
            return false;
        }
        let mut next = guard.as_ref().clone();
        f(&mut next);
        *guard = Arc::new(next);
        true
    }

    /// Empty every collection, flag and error
    pub fn reset(&self) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        *guard = Arc::new(StoreState::default());
    }

    pub fn is_loading(&self, category: Category) -> bool {
        self.snapshot().loading.get(category)
    }

    pub fn error(&self, category: Category) -> Option<String> {
        self.snapshot().errors.get(category).map(str::to_string)
    }

    pub fn set_loading(&self, category: Category, loading: bool) {
        self.update(|s| s.loading.set(category, loading));
    }

    pub fn set_error(&self, category: Category, message: Option<String>) {
        self.update(|s| s.errors.set(category, message));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

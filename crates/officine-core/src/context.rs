//! The synchronization context handed to the presentation layer.
//!
//! A `SyncContext` owns one session's store, caches, event bus, request
//! coordinator and mutation engine. It is built at session start, reset by
//! [`SyncContext::refresh_all`] and stopped with [`SyncContext::shutdown`].
//! Clones share the same session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::api::{Aggregate, ApiError, Backend, ResultOrigin, SearchQuery, SearchResult};
use crate::cache::search::lock;
use crate::cache::{CacheStats, KeyedCache, SearchCaches, SearchKey};
use crate::config::SyncSettings;
use crate::error::{Result, SyncError};
use crate::events::{DomainEvent, EventBus, EventName, Subscription};
use crate::models::{
    Article, DashboardCounts, Famille, Medecin, Medicament, MonthlySale, Ordonnance, TopMedication,
};
use crate::store::{Category, DataStore, Mutable, Resource, StoreState};
use crate::sync::loader::{self, LoadHandle, LoadPlan, LoadStep, StageRunner};
use crate::sync::{Admission, MutationEngine, RequestCoordinator, Ticket};

/// A decoded dashboard aggregate, as held in the statistics cache.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateData {
    Dashboard(DashboardCounts),
    VentesMensuelles(Vec<MonthlySale>),
    TopMedicaments(Vec<TopMedication>),
}

impl AggregateData {
    fn decode(aggregate: Aggregate, value: Value) -> std::result::Result<Self, ApiError> {
        fn parse<T: DeserializeOwned>(aggregate: Aggregate, value: Value) -> std::result::Result<T, ApiError> {
            serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(format!("{}: {}", aggregate, e)))
        }
        Ok(match aggregate {
            Aggregate::Dashboard => AggregateData::Dashboard(parse(aggregate, value)?),
            Aggregate::VentesMensuelles => AggregateData::VentesMensuelles(parse(aggregate, value)?),
            Aggregate::TopMedicaments => AggregateData::TopMedicaments(parse(aggregate, value)?),
        })
    }
}

/// Outcome of a statistics load. Each aggregate succeeds or fails alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsReport {
    pub loaded: Vec<Aggregate>,
    pub failures: Vec<(Aggregate, String)>,
    /// Another statistics load was already running
    pub skipped: bool,
}

impl StatsReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }

    fn error_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|(aggregate, message)| format!("{}: {}", aggregate, message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Cache occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheReport {
    pub search_entries: usize,
    pub statistics: CacheStats,
}

/// One write against a mutable resource, for callers that dispatch on data.
#[derive(Debug, Clone)]
pub enum Mutation<D> {
    Create(D),
    Update(i64, D),
    Delete(i64),
}

#[derive(Default)]
struct Tasks {
    load: Vec<AbortHandle>,
    sweeper: Option<JoinHandle<()>>,
    stats_refresh: Option<AbortHandle>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    settings: SyncSettings,
    store: Arc<DataStore>,
    bus: EventBus,
    coordinator: RequestCoordinator,
    caches: Arc<SearchCaches>,
    stats_cache: Mutex<KeyedCache<Aggregate, AggregateData>>,
    /// Bumped whenever the statistics go stale; loads started under an
    /// older epoch neither cache nor install what they fetched
    stats_epoch: AtomicU64,
    engine: MutationEngine,
    tasks: Mutex<Tasks>,
    subscriptions: Mutex<Vec<Subscription>>,
}

#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<Inner>,
}

impl SyncContext {
    pub fn new(backend: Arc<dyn Backend>, settings: SyncSettings) -> Self {
        let store = Arc::new(DataStore::new());
        let bus = EventBus::new();
        let engine = MutationEngine::new(Arc::clone(&store), Arc::clone(&backend), bus.clone());
        let caches = Arc::new(SearchCaches::new(&settings));
        let stats_cache = Mutex::new(KeyedCache::with_eviction_batch(
            Aggregate::ALL.len(),
            settings.stats_ttl(),
            1,
        ));

        let context = Self {
            inner: Arc::new(Inner {
                backend,
                settings,
                store,
                bus,
                coordinator: RequestCoordinator::new(),
                caches,
                stats_cache,
                stats_epoch: AtomicU64::new(0),
                engine,
                tasks: Mutex::new(Tasks::default()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        };
        context.wire_invalidation();
        context
    }

    /// Internal subscribers keeping caches in step with confirmed mutations
    fn wire_invalidation(&self) {
        let caches = Arc::clone(&self.inner.caches);
        let on_change = self.inner.bus.subscribe(EventName::DataChanged, move |event| {
            if let DomainEvent::DataChanged(category) = event {
                caches.invalidate(*category);
            }
            Ok(())
        });

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_stats = self.inner.bus.subscribe(EventName::StatsRefreshNeeded, move |_| {
            if let Some(inner) = weak.upgrade() {
                SyncContext { inner }.refresh_statistics_background();
            }
            Ok(())
        });

        self.subscriptions().extend([on_change, on_stats]);
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.inner.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.inner.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Read access =====

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn snapshot(&self) -> Arc<StoreState> {
        self.inner.store.snapshot()
    }

    pub fn is_loading(&self, category: Category) -> bool {
        self.inner.store.is_loading(category)
    }

    pub fn error(&self, category: Category) -> Option<String> {
        self.inner.store.error(category)
    }

    /// Families and the first article page have resolved
    pub fn initial_loaded(&self) -> bool {
        self.snapshot().initial_loaded
    }

    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&DomainEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(name, handler)
    }

    pub fn has_pending_mutation(&self, category: Category, id: i64) -> bool {
        self.inner.engine.has_pending(category, id)
    }

    pub fn cache_report(&self) -> CacheReport {
        CacheReport {
            search_entries: self.inner.caches.len(),
            statistics: lock(&self.inner.stats_cache).stats(),
        }
    }

    // ===== Searches =====

    /// Cache-aware, de-duplicated search.
    ///
    /// A fresh cached page is returned without a network call. An identical
    /// search already in flight yields the suppressed sentinel, as does a
    /// search superseded while it was waiting for the server. Failures leave
    /// the last good collection in place and fill the category's error slot.
    pub async fn search<T: Resource>(&self, query: &SearchQuery) -> Result<SearchResult<T>> {
        let category = T::CATEGORY;
        let query = query.normalized();
        let key = SearchKey::from_query(&query);

        let cached = lock(T::cache(&self.inner.caches)).get(&key);
        if let Some(hit) = cached {
            debug!(%category, %key, "Search cache hit");
            // Whatever else is in flight for the category is now stale
            self.inner.coordinator.cancel(category);
            let mut result = hit.as_ref().clone();
            result.origin = ResultOrigin::Cache;
            let generation = self.inner.store.generation();
            self.install(&query, &result, generation);
            return Ok(result);
        }

        match self.inner.coordinator.begin(category, key) {
            Admission::Proceed(ticket) => self.fetch(query, ticket).await,
            Admission::Duplicate => Ok(SearchResult::suppressed()),
        }
    }

    async fn fetch<T: Resource>(&self, query: SearchQuery, ticket: Ticket) -> Result<SearchResult<T>> {
        let category = T::CATEGORY;
        let store = &self.inner.store;
        let generation = store.generation();
        store.set_loading(category, true);
        debug!(%category, key = %ticket.key(), "Search sent");

        let outcome = match self.inner.backend.search(category, &query).await {
            Ok(envelope) => envelope.into_search::<T>(),
            Err(e) => Err(e),
        };

        if ticket.token().check().is_err() || store.generation() != generation {
            debug!(%category, key = %ticket.key(), "Discarding superseded search result");
            return Ok(SearchResult::suppressed());
        }

        match outcome {
            Ok(result) => {
                lock(T::cache(&self.inner.caches)).set(ticket.key().clone(), result.clone());
                self.install(&query, &result, generation);
                debug!(%category, items = result.items.len(), "Search installed");
                Ok(result)
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(%category, key = %ticket.key(), error = %err, "Search failed");
                store.update_if(generation, |state| {
                    state.loading.set(category, false);
                    state.errors.set(category, Some(err.to_string()));
                });
                Err(err)
            }
        }
    }

    fn install<T: Resource>(&self, query: &SearchQuery, result: &SearchResult<T>, generation: u64) {
        let category = T::CATEGORY;
        let hidden = self.inner.engine.pending_deletes(category);
        self.inner.store.update_if(generation, |state| {
            T::install(state, result, &hidden);
            if category == Category::Articles {
                state.articles_query = query.clone();
            }
            state.loading.set(category, false);
            state.errors.set(category, None);
        });
    }

    /// Article search from the landing screen
    pub async fn search_articles(&self, term: &str, famille: Option<&str>) -> Result<SearchResult<Article>> {
        let mut query = SearchQuery::term(term).with_page_size(self.inner.settings.page_size);
        if let Some(famille) = famille {
            query = query.with_filter(famille);
        }
        self.search::<Article>(&query).await
    }

    /// Another page of the current article search
    pub async fn load_articles_page(&self, page: u32) -> Result<SearchResult<Article>> {
        let query = self.snapshot().articles_query.clone().with_page(page);
        self.search::<Article>(&query).await
    }

    /// The page after the one on screen, if there is one
    pub async fn next_articles_page(&self) -> Result<Option<SearchResult<Article>>> {
        let state = self.snapshot();
        if !state.articles_pagination.has_next() {
            return Ok(None);
        }
        let page = state.articles_pagination.current_page + 1;
        self.load_articles_page(page).await.map(Some)
    }

    // ===== Bulk loads =====

    /// Load the first `limit` records of a category, unless a load of that
    /// category is already running
    async fn load_batch<T: Resource>(&self, limit: u32) -> Result<()> {
        let category = T::CATEGORY;
        let Some(_latch) = self.inner.coordinator.try_latch(category) else {
            debug!(%category, limit, "Batch load skipped, category already loading");
            return Ok(());
        };
        let query = SearchQuery::default().with_page_size(limit);
        self.search::<T>(&query).await.map(|_| ())
    }

    pub async fn load_familles(&self) -> Result<()> {
        let category = Category::Familles;
        let Some(_latch) = self.inner.coordinator.try_latch(category) else {
            return Ok(());
        };
        let store = &self.inner.store;
        let generation = store.generation();
        store.set_loading(category, true);

        let outcome = match self.inner.backend.search(category, &SearchQuery::default()).await {
            Ok(envelope) => envelope.into_search::<Famille>(),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                debug!(count = result.items.len(), "Familles loaded");
                store.update_if(generation, |state| {
                    state.familles = Arc::new(result.items);
                    state.loading.set(category, false);
                    state.errors.set(category, None);
                });
                Ok(())
            }
            Err(e) => {
                let err = SyncError::from(e);
                warn!(error = %err, "Failed to load familles");
                store.update_if(generation, |state| {
                    state.loading.set(category, false);
                    state.errors.set(category, Some(err.to_string()));
                });
                Err(err)
            }
        }
    }

    /// First page of the unfiltered article search
    pub async fn load_first_articles(&self) -> Result<SearchResult<Article>> {
        let query = SearchQuery::default().with_page_size(self.inner.settings.page_size);
        self.search::<Article>(&query).await
    }

    pub async fn load_medicaments(&self) -> Result<()> {
        self.load_batch::<Medicament>(self.inner.settings.medicaments_batch).await
    }

    pub async fn load_medecins(&self) -> Result<()> {
        self.load_batch::<Medecin>(self.inner.settings.medecins_batch).await
    }

    pub async fn load_ordonnances(&self) -> Result<()> {
        self.load_batch::<Ordonnance>(self.inner.settings.ordonnances_batch).await
    }

    pub async fn load_all_medicaments(&self) -> Result<()> {
        self.load_batch::<Medicament>(self.inner.settings.full_limit).await
    }

    pub async fn load_all_medecins(&self) -> Result<()> {
        self.load_batch::<Medecin>(self.inner.settings.full_limit).await
    }

    // ===== Statistics =====

    /// Fetch the three dashboard aggregates side by side.
    ///
    /// One failing aggregate does not stop the others; every failure is
    /// listed in the report and in the statistics error slot. The call
    /// itself only fails if the load could not be attempted.
    pub async fn load_statistiques(&self) -> Result<StatsReport> {
        self.fetch_statistiques(false).await
    }

    async fn fetch_statistiques(&self, silent: bool) -> Result<StatsReport> {
        let category = Category::Statistiques;
        // Background refreshes run alongside a staged load; the epoch decides who installs
        let _latch = if silent {
            None
        } else {
            match self.inner.coordinator.try_latch(category) {
                Some(guard) => Some(guard),
                None => return Ok(StatsReport::skipped()),
            }
        };

        let store = &self.inner.store;
        let generation = store.generation();
        let epoch = self.inner.stats_epoch.load(Ordering::SeqCst);
        if !silent {
            store.set_loading(category, true);
        }

        let (dashboard, ventes, top) = tokio::join!(
            self.aggregate(Aggregate::Dashboard, epoch),
            self.aggregate(Aggregate::VentesMensuelles, epoch),
            self.aggregate(Aggregate::TopMedicaments, epoch),
        );

        let mut report = StatsReport::default();
        let mut parts = Vec::new();
        for (aggregate, outcome) in [
            (Aggregate::Dashboard, dashboard),
            (Aggregate::VentesMensuelles, ventes),
            (Aggregate::TopMedicaments, top),
        ] {
            match outcome {
                Ok(data) => {
                    report.loaded.push(aggregate);
                    parts.push(data);
                }
                Err(e) => {
                    debug!(%aggregate, error = %e, "Aggregate failed");
                    report.failures.push((aggregate, e.to_string()));
                }
            }
        }

        if self.inner.stats_epoch.load(Ordering::SeqCst) != epoch {
            debug!("Statistics went stale during the load, discarding");
            if !silent {
                store.update_if(generation, |state| state.loading.set(category, false));
            }
            return Ok(report);
        }

        let message = report.error_message();
        store.update_if(generation, |state| {
            let stats = Arc::make_mut(&mut state.statistiques);
            for part in parts {
                match part {
                    AggregateData::Dashboard(d) => stats.dashboard = Some(d),
                    AggregateData::VentesMensuelles(v) => stats.ventes_mensuelles = Some(v),
                    AggregateData::TopMedicaments(t) => stats.top_medicaments = Some(t),
                }
            }
            if !silent {
                state.loading.set(category, false);
                state.errors.set(category, message.clone());
            }
        });

        match message {
            Some(ref m) if silent => debug!(failures = %m, "Background statistics refresh incomplete"),
            Some(ref m) => warn!(failures = %m, "Statistics partially loaded"),
            None => info!("Statistics loaded"),
        }
        Ok(report)
    }

    async fn aggregate(&self, aggregate: Aggregate, epoch: u64) -> Result<AggregateData> {
        let cached = lock(&self.inner.stats_cache).get(&aggregate);
        if let Some(hit) = cached {
            return Ok(hit.as_ref().clone());
        }

        let value = self.inner.backend.fetch_aggregate(aggregate).await?;
        let data = AggregateData::decode(aggregate, value)?;
        if self.inner.stats_epoch.load(Ordering::SeqCst) == epoch {
            lock(&self.inner.stats_cache).set(aggregate, data.clone());
        }
        Ok(data)
    }

    /// Mark the statistics stale and reload them in the background.
    ///
    /// Failures are logged and otherwise ignored. Without a Tokio runtime
    /// only the cache is cleared.
    pub fn refresh_statistics_background(&self) {
        self.inner.stats_epoch.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.stats_cache).clear();

        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime, statistics will reload on next request");
            return;
        };
        let context = self.clone();
        let task = handle.spawn(async move {
            if let Err(e) = context.fetch_statistiques(true).await {
                debug!(error = %e, "Background statistics refresh failed");
            }
        });

        if let Some(previous) = self.tasks().stats_refresh.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    // ===== Mutations =====

    /// Optimistic create; the projection is in the store when this returns
    pub fn create<T: Mutable>(&self, draft: T::Draft) -> impl Future<Output = Result<T>> + Send + '_ {
        self.inner.engine.create::<T>(draft)
    }

    /// Optimistic update; the patch is in the store when this returns
    pub fn update<T: Mutable>(&self, id: i64, draft: T::Draft) -> impl Future<Output = Result<T>> + Send + '_ {
        self.inner.engine.update::<T>(id, draft)
    }

    /// Optimistic delete; the record is gone from the store when this returns
    pub fn delete<T: Mutable>(&self, id: i64) -> impl Future<Output = Result<()>> + Send + '_ {
        self.inner.engine.delete::<T>(id)
    }

    /// Run one mutation. Resolves to the confirmed record, or `None` for deletes.
    pub async fn mutate<T: Mutable>(&self, mutation: Mutation<T::Draft>) -> Result<Option<T>> {
        match mutation {
            Mutation::Create(draft) => self.create::<T>(draft).await.map(Some),
            Mutation::Update(id, draft) => self.update::<T>(id, draft).await.map(Some),
            Mutation::Delete(id) => self.delete::<T>(id).await.map(|()| None),
        }
    }

    // ===== Lifecycle =====

    /// Start the staged load of every category.
    ///
    /// The returned handle can be awaited; [`refresh_all`](Self::refresh_all)
    /// and [`shutdown`](Self::shutdown) abort it either way.
    pub fn load_initial(&self) -> LoadHandle {
        self.inner.store.set_loading(Category::Initial, true);
        let handle = loader::start(&LoadPlan::from_settings(&self.inner.settings), Arc::new(self.clone()));
        let previous = std::mem::replace(&mut self.tasks().load, handle.abort_handles());
        for task in previous {
            task.abort();
        }
        handle
    }

    fn abort_background(&self) {
        let mut tasks = self.tasks();
        for task in tasks.load.drain(..) {
            task.abort();
        }
        if let Some(task) = tasks.stats_refresh.take() {
            task.abort();
        }
    }

    /// Drop everything and load again from scratch.
    ///
    /// In-flight searches are cancelled, both caches and every latch are
    /// cleared, the store is emptied, then the staged load restarts.
    pub fn refresh_all(&self) -> LoadHandle {
        info!("Refreshing all data");
        self.abort_background();
        self.inner.coordinator.cancel_all();
        self.inner.caches.clear_all();
        lock(&self.inner.stats_cache).clear();
        self.inner.stats_epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.store.reset();
        self.load_initial()
    }

    /// Point the API at another database folder, then reload everything
    pub async fn select_folder(&self, path: &str) -> Result<LoadHandle> {
        let envelope = self.inner.backend.select_folder(path).await?;
        envelope.ensure_success()?;
        info!(path, "Database folder selected");
        Ok(self.refresh_all())
    }

    /// Remove expired entries from the search and statistics caches
    pub fn sweep_caches(&self) -> usize {
        let searches = self.inner.caches.sweep_all();
        let statistics = lock(&self.inner.stats_cache).sweep();
        if searches + statistics > 0 {
            debug!(searches, statistics, "Expired cache entries swept");
        }
        searches + statistics
    }

    /// Sweep the caches periodically until [`shutdown`](Self::shutdown).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_cache_sweeper(&self) {
        let period = self.inner.settings.sweep_interval();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SyncContext { inner }.sweep_caches();
            }
        });
        if let Some(previous) = self.tasks().sweeper.replace(task) {
            previous.abort();
        }
    }

    /// Stop background work and cancel in-flight searches
    pub fn shutdown(&self) {
        self.abort_background();
        if let Some(sweeper) = self.tasks().sweeper.take() {
            sweeper.abort();
        }
        self.inner.coordinator.cancel_all();
        for subscription in self.subscriptions().drain(..) {
            subscription.unsubscribe();
        }
        info!("Sync context shut down");
    }
}

#[async_trait]
impl StageRunner for SyncContext {
    async fn run(&self, step: LoadStep) -> Result<()> {
        match step {
            LoadStep::Familles => self.load_familles().await,
            LoadStep::ArticlesFirstPage => self.load_first_articles().await.map(|_| ()),
            LoadStep::Medicaments => self.load_medicaments().await,
            LoadStep::Medecins => self.load_medecins().await,
            LoadStep::Ordonnances => self.load_ordonnances().await,
            LoadStep::Statistiques => self.load_statistiques().await.map(|_| ()),
        }
    }

    fn on_initial_ready(&self) {
        self.inner.store.update(|state| {
            let failed = state
                .errors
                .get(Category::Familles)
                .or_else(|| state.errors.get(Category::Articles))
                .map(str::to_string);
            state.errors.set(Category::Initial, failed);
            state.loading.set(Category::Initial, false);
            state.initial_loaded = true;
        });
        info!("Initial data loaded");
    }
}


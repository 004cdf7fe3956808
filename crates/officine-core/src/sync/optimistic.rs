//! Optimistic create, update and delete with rollback.
//!
//! Each mutation goes `Idle -> Pending -> Confirmed | RolledBack`. The
//! pending state is written to the store before the returned future is
//! first polled, so the change is visible to the next read even though the
//! network call has not been issued yet.
//!
//! Updates and deletes park the prior version of the record in a rollback
//! map for exactly as long as their remote call runs. A second mutation for
//! a record that already has a parked snapshot is refused.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::error::{Result, SyncError};
use crate::events::{DomainEvent, Entity, EventBus};
use crate::models::Tracked;
use crate::store::{Category, DataStore, Mutable, StoreState};

/// Mutations that park a rollback snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Update,
    Delete,
}

/// Prior version of a record, held while its mutation is in flight.
#[derive(Debug, Clone)]
pub struct RollbackSnapshot {
    pub entity_id: i64,
    pub kind: MutationKind,
    pub prior_state: Entity,
    pub captured_at: DateTime<Utc>,
}

type SnapshotKey = (Category, i64);

pub struct MutationEngine {
    store: Arc<DataStore>,
    backend: Arc<dyn Backend>,
    bus: EventBus,
    rollback: Mutex<HashMap<SnapshotKey, RollbackSnapshot>>,
    /// Temporary ids count down from -1; server ids are positive
    next_temp_id: AtomicI64,
}

fn encode<D: serde::Serialize>(draft: &D) -> Result<Value> {
    serde_json::to_value(draft).map_err(|e| SyncError::Validation(e.to_string()))
}

fn replace_by_id<T: Mutable>(collection: &mut Arc<Vec<Tracked<T>>>, id: i64, record: Tracked<T>) -> bool {
    let items = Arc::make_mut(collection);
    match items.iter().position(|t| t.item.id() == id) {
        Some(pos) => {
            items[pos] = record;
            true
        }
        None => false,
    }
}

fn remove_by_id<T: Mutable>(collection: &mut Arc<Vec<Tracked<T>>>, id: i64) -> Option<Tracked<T>> {
    let items = Arc::make_mut(collection);
    let pos = items.iter().position(|t| t.item.id() == id)?;
    Some(items.remove(pos))
}

/// Put `record` back where the natural ordering places it
fn insert_sorted<T: Mutable>(collection: &mut Arc<Vec<Tracked<T>>>, record: Tracked<T>) {
    let items = Arc::make_mut(collection);
    let pos = items
        .iter()
        .position(|t| T::natural_order(&record.item, &t.item) == std::cmp::Ordering::Less)
        .unwrap_or(items.len());
    items.insert(pos, record);
}

/// Swap the temporary record for the server's, dropping any copy of the
/// server record a reload already brought in
fn confirm_created<T: Mutable>(collection: &mut Arc<Vec<Tracked<T>>>, temp_id: i64, record: T) -> bool {
    let items = Arc::make_mut(collection);
    let Some(pos) = items.iter().position(|t| t.item.id() == temp_id) else {
        return false;
    };
    let id = record.id();
    items[pos] = Tracked::confirmed(record);
    let mut index = 0;
    items.retain(|t| {
        let keep = index == pos || t.item.id() != id;
        index += 1;
        keep
    });
    true
}

impl MutationEngine {
    pub fn new(store: Arc<DataStore>, backend: Arc<dyn Backend>, bus: EventBus) -> Self {
        Self {
            store,
            backend,
            bus,
            rollback: Mutex::new(HashMap::new()),
            next_temp_id: AtomicI64::new(-1),
        }
    }

    fn snapshots(&self) -> MutexGuard<'_, HashMap<SnapshotKey, RollbackSnapshot>> {
        self.rollback.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while an update or delete for this record is in flight
    pub fn has_pending(&self, category: Category, id: i64) -> bool {
        self.snapshots().contains_key(&(category, id))
    }

    pub fn pending_count(&self) -> usize {
        self.snapshots().len()
    }

    /// Ids with a delete in flight; searches keep them out of the store
    pub fn pending_deletes(&self, category: Category) -> HashSet<i64> {
        self.snapshots()
            .values()
            .filter(|s| s.kind == MutationKind::Delete && s.prior_state.category() == category)
            .map(|s| s.entity_id)
            .collect()
    }

    fn take_snapshot(&self, category: Category, id: i64) -> Option<RollbackSnapshot> {
        self.snapshots().remove(&(category, id))
    }

    /// Success path of every mutation: entity event, then the coarse ones
    fn announce(&self, event: DomainEvent) {
        let category = event.entity().map(Entity::category);
        self.bus.publish(event);
        if let Some(category) = category {
            self.bus.publish(DomainEvent::DataChanged(category));
        }
        self.bus.publish(DomainEvent::StatsRefreshNeeded);
    }

    /// Park the prior version of `id` and apply `edit` to the store.
    ///
    /// Refuses the call when another mutation for `id` is pending.
    fn begin<T: Mutable>(
        &self,
        id: i64,
        kind: MutationKind,
        edit: impl FnOnce(&mut StoreState, &Tracked<T>),
    ) -> Result<u64> {
        let mut snapshots = self.snapshots();
        if snapshots.contains_key(&(T::CATEGORY, id)) {
            return Err(SyncError::Validation(format!(
                "Une modification est déjà en cours pour l'enregistrement {}",
                id
            )));
        }

        let generation = self.store.generation();
        let prior = self.store.update(|state| {
            let current = T::collection(state).iter().find(|t| t.item.id() == id).cloned()?;
            if current.is_loading {
                return Some(Err(SyncError::Validation(format!(
                    "L'enregistrement {} est en cours d'enregistrement",
                    id
                ))));
            }
            edit(state, &current);
            Some(Ok(current.item))
        });

        let prior = match prior {
            Some(result) => result?,
            None => {
                return Err(SyncError::Validation(format!(
                    "Enregistrement {} introuvable dans {}",
                    id,
                    T::CATEGORY
                )))
            }
        };

        snapshots.insert(
            (T::CATEGORY, id),
            RollbackSnapshot {
                entity_id: id,
                kind,
                prior_state: prior.into_entity(),
                captured_at: Utc::now(),
            },
        );
        Ok(generation)
    }

    /// Optimistically create a record.
    ///
    /// A projection with a temporary id is inserted at the head of the
    /// collection as soon as this is called. The server record replaces it
    /// on success; on failure, or if the future is dropped first, it is
    /// removed.
    pub fn create<T: Mutable>(&self, draft: T::Draft) -> impl Future<Output = Result<T>> + Send + '_ {
        let prepared = T::validate_create(&draft).and_then(|()| encode(&draft)).map(|payload| {
            let temp_id = self.next_temp_id.fetch_sub(1, Ordering::SeqCst);
            let generation = self.store.generation();
            self.store.update(|state| {
                let projected = T::project(&draft, temp_id, state);
                Arc::make_mut(T::collection_mut(state)).insert(0, Tracked::pending(projected));
            });
            debug!(category = %T::CATEGORY, temp_id, "Optimistic create applied");
            (payload, Pending::<T>::new(self, Undo::Create { temp_id }, generation))
        });

        async move {
            let (payload, pending) = prepared?;

            let outcome = match self.backend.create(T::CATEGORY, payload).await {
                Ok(envelope) => envelope.into_entity::<T>(),
                Err(e) => Err(e),
            };

            let temp_id = pending.id();
            match outcome {
                Ok(record) => {
                    let generation = pending.generation;
                    pending.confirm();
                    self.store.update_if(generation, |state| {
                        if !confirm_created(T::collection_mut(state), temp_id, record.clone()) {
                            debug!(temp_id, "Temporary record gone before confirmation");
                        }
                    });
                    info!(category = %T::CATEGORY, temp_id, id = record.id(), "Create confirmed");
                    self.announce(DomainEvent::EntityCreated(record.clone().into_entity()));
                    Ok(record)
                }
                Err(e) => {
                    pending.roll_back();
                    warn!(category = %T::CATEGORY, temp_id, error = %e, "Create failed, temporary record removed");
                    Err(e.into())
                }
            }
        }
    }

    /// Optimistically update record `id` with the fields set in `draft`.
    ///
    /// The patch is visible as soon as this is called. On failure, or if the
    /// future is dropped first, the record is restored to its exact prior
    /// state.
    pub fn update<T: Mutable>(&self, id: i64, draft: T::Draft) -> impl Future<Output = Result<T>> + Send + '_ {
        let prepared = T::validate_update(&draft).and_then(|()| encode(&draft)).and_then(|payload| {
            let generation = self.begin::<T>(id, MutationKind::Update, |state, current| {
                let mut patched = current.item.clone();
                patched.apply(&draft, state);
                replace_by_id(T::collection_mut(state), id, Tracked::pending(patched));
            })?;
            debug!(category = %T::CATEGORY, id, "Optimistic update applied");
            Ok((payload, Pending::<T>::new(self, Undo::Restore { id }, generation)))
        });

        async move {
            let (payload, pending) = prepared?;

            let outcome = match self.backend.update(T::CATEGORY, id, payload).await {
                Ok(envelope) => envelope.into_entity::<T>(),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(record) => {
                    let generation = pending.generation;
                    pending.confirm();
                    let confirmed = Tracked::confirmed(record.clone());
                    self.store.update_if(generation, |state| {
                        replace_by_id(T::collection_mut(state), id, confirmed);
                    });
                    info!(category = %T::CATEGORY, id, "Update confirmed");
                    self.announce(DomainEvent::EntityUpdated(record.clone().into_entity()));
                    Ok(record)
                }
                Err(e) => {
                    pending.roll_back();
                    warn!(category = %T::CATEGORY, id, error = %e, "Update failed, record restored");
                    Err(e.into())
                }
            }
        }
    }

    /// Optimistically delete record `id`.
    ///
    /// The record leaves the collection as soon as this is called. On
    /// failure, or if the future is dropped first, it is put back at its
    /// natural position.
    pub fn delete<T: Mutable>(&self, id: i64) -> impl Future<Output = Result<()>> + Send + '_ {
        let prepared = self
            .begin::<T>(id, MutationKind::Delete, |state, _| {
                remove_by_id(T::collection_mut(state), id);
            })
            .map(|generation| Pending::<T>::new(self, Undo::Reinsert { id }, generation));
        if prepared.is_ok() {
            debug!(category = %T::CATEGORY, id, "Optimistic delete applied");
        }

        async move {
            let pending = prepared?;

            let outcome = match self.backend.delete(T::CATEGORY, id).await {
                Ok(envelope) => envelope.ensure_success().map(|_| ()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    let prior = pending.confirm().and_then(|s| T::from_entity(s.prior_state));
                    info!(category = %T::CATEGORY, id, "Delete confirmed");
                    if let Some(prior) = prior {
                        self.announce(DomainEvent::EntityDeleted(prior.into_entity()));
                    }
                    Ok(())
                }
                Err(e) => {
                    pending.roll_back();
                    warn!(category = %T::CATEGORY, id, error = %e, "Delete failed, record restored");
                    Err(e.into())
                }
            }
        }
    }
}

/// How to take back an optimistic change
#[derive(Debug, Clone, Copy)]
enum Undo {
    /// Remove the temporary record
    Create { temp_id: i64 },
    /// Put the parked version back in place
    Restore { id: i64 },
    /// Put the parked version back at its natural position
    Reinsert { id: i64 },
}

/// An applied optimistic change waiting for the server.
///
/// Rolls the change back when dropped unless `confirm` was called, so a
/// mutation future dropped mid-flight leaves neither a parked snapshot nor
/// a record stuck in its pending state.
struct Pending<'a, T: Mutable> {
    engine: &'a MutationEngine,
    undo: Undo,
    generation: u64,
    settled: bool,
    _resource: PhantomData<fn() -> T>,
}

impl<'a, T: Mutable> Pending<'a, T> {
    fn new(engine: &'a MutationEngine, undo: Undo, generation: u64) -> Self {
        Self {
            engine,
            undo,
            generation,
            settled: false,
            _resource: PhantomData,
        }
    }

    fn id(&self) -> i64 {
        match self.undo {
            Undo::Create { temp_id } => temp_id,
            Undo::Restore { id } | Undo::Reinsert { id } => id,
        }
    }

    /// The server accepted the change; hands back the parked snapshot, if any
    fn confirm(mut self) -> Option<RollbackSnapshot> {
        self.settled = true;
        match self.undo {
            Undo::Create { .. } => None,
            Undo::Restore { id } | Undo::Reinsert { id } => self.engine.take_snapshot(T::CATEGORY, id),
        }
    }

    fn roll_back(mut self) {
        self.settled = true;
        self.undo_change();
    }

    fn undo_change(&self) {
        let store = &self.engine.store;
        match self.undo {
            Undo::Create { temp_id } => {
                store.update_if(self.generation, |state| {
                    remove_by_id(T::collection_mut(state), temp_id);
                });
            }
            Undo::Restore { id } | Undo::Reinsert { id } => {
                let snapshot = self.engine.take_snapshot(T::CATEGORY, id);
                let Some(prior) = snapshot.and_then(|s| T::from_entity(s.prior_state)) else {
                    warn!(category = %T::CATEGORY, id, "No snapshot to restore");
                    return;
                };
                let reinsert = matches!(self.undo, Undo::Reinsert { .. });
                store.update_if(self.generation, |state| {
                    let collection = T::collection_mut(state);
                    if reinsert {
                        insert_sorted(collection, Tracked::confirmed(prior));
                    } else {
                        replace_by_id(collection, id, Tracked::confirmed(prior));
                    }
                });
            }
        }
    }
}

impl<T: Mutable> Drop for Pending<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(category = %T::CATEGORY, id = self.id(), "Mutation dropped before the server answered, rolling back");
            self.undo_change();
        }
    }
}

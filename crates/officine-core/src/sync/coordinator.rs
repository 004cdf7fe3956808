//! Request de-duplication, supersession and per-category load latches.
//!
//! Two guards live here:
//!
//! - **Search tickets.** Before a search for key K in category C goes out,
//!   [`RequestCoordinator::begin`] either rejects it as a duplicate (the
//!   latest request for C is K and is still in flight) or cancels whatever
//!   else is in flight for C and hands out a [`Ticket`]. The ticket carries
//!   the cancellation token to check once the call resolves, and clears the
//!   in-flight slot when dropped.
//! - **Load latches.** [`RequestCoordinator::try_latch`] is a per-category
//!   mutual-exclusion flag for bulk loads; the [`LatchGuard`] releases it on
//!   drop, including when the load returned early with an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::cancel::CancelToken;
use crate::cache::SearchKey;
use crate::store::Category;

struct InFlight {
    key: SearchKey,
    token: CancelToken,
}

#[derive(Default)]
struct CoordinatorState {
    in_flight: HashMap<Category, InFlight>,
    /// Held latches, by the epoch of the guard holding them
    latches: HashMap<Category, u64>,
    next_epoch: u64,
}

#[derive(Clone, Default)]
pub struct RequestCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

/// Outcome of asking to issue a search.
pub enum Admission {
    Proceed(Ticket),
    /// The same search is already in flight
    Duplicate,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn begin(&self, category: Category, key: SearchKey) -> Admission {
        let mut state = self.lock();

        if let Some(current) = state.in_flight.get(&category) {
            if current.key == key && !current.token.is_cancelled() {
                debug!(%category, %key, "Duplicate search suppressed");
                return Admission::Duplicate;
            }
            debug!(%category, superseded = %current.key, by = %key, "Cancelling superseded search");
            current.token.cancel();
        }

        let token = CancelToken::new();
        state.in_flight.insert(
            category,
            InFlight {
                key: key.clone(),
                token: token.clone(),
            },
        );

        Admission::Proceed(Ticket {
            category,
            key,
            token,
            state: Arc::clone(&self.state),
        })
    }

    /// Key of the search currently in flight for `category`, if any
    pub fn in_flight(&self, category: Category) -> Option<SearchKey> {
        self.lock().in_flight.get(&category).map(|f| f.key.clone())
    }

    /// Cancel whatever search is in flight for `category`
    pub fn cancel(&self, category: Category) -> bool {
        match self.lock().in_flight.remove(&category) {
            Some(flight) => {
                debug!(%category, key = %flight.key, "Cancelling in-flight search");
                flight.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight search and release every latch
    pub fn cancel_all(&self) {
        let mut state = self.lock();
        for (category, flight) in state.in_flight.drain() {
            debug!(%category, key = %flight.key, "Cancelling in-flight search");
            flight.token.cancel();
        }
        // Guards still alive see a different epoch (or none) and leave newer latches alone
        state.latches.clear();
    }

    pub fn try_latch(&self, category: Category) -> Option<LatchGuard> {
        let mut state = self.lock();
        if state.latches.contains_key(&category) {
            debug!(%category, "Load already running, skipping");
            return None;
        }
        state.next_epoch += 1;
        let epoch = state.next_epoch;
        state.latches.insert(category, epoch);
        Some(LatchGuard {
            category,
            epoch,
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_latched(&self, category: Category) -> bool {
        self.lock().latches.contains_key(&category)
    }
}

/// Permission to run one search. Dropping it frees the category's in-flight
/// slot if this search still owns it.
pub struct Ticket {
    category: Category,
    key: SearchKey,
    token: CancelToken,
    state: Arc<Mutex<CoordinatorState>>,
}

impl Ticket {
    pub fn key(&self) -> &SearchKey {
        &self.key
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let owns_slot = state
            .in_flight
            .get(&self.category)
            .map(|f| f.token.same_as(&self.token))
            .unwrap_or(false);
        if owns_slot {
            state.in_flight.remove(&self.category);
        }
    }
}

/// Held while a bulk load for one category runs.
pub struct LatchGuard {
    category: Category,
    epoch: u64,
    state: Arc<Mutex<CoordinatorState>>,
}

impl LatchGuard {
    pub fn category(&self) -> Category {
        self.category
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.latches.get(&self.category) == Some(&self.epoch) {
            state.latches.remove(&self.category);
        }
    }
}

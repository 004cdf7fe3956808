//! The data aggregate store.
//!
//! One copy-on-write `StoreState` holds every collection the console
//! renders, with per-category loading flags and error slots. Writers go
//! through the sync layer (`SyncContext`, the loader and the mutation
//! engine); views only read snapshots.

pub mod category;
pub mod resource;
pub mod state;

pub use category::{Category, ErrorMap, LoadingFlags};
pub use resource::{Mutable, Resource};
pub use state::{DataStore, StoreState};

//! Officine core - the data synchronization layer of the pharmacy console.
//!
//! This crate keeps a session-wide, read-mostly copy of the pharmacy data
//! (articles, families, medications, doctors, prescriptions, statistics) in
//! step with the REST API that wraps the legacy database:
//!
//! - searches are cached per normalized key and de-duplicated while in flight
//! - writes are applied optimistically and rolled back when the server refuses
//! - confirmed changes are broadcast on an in-process event bus
//! - the initial load is staged so the landing screen is usable first
//!
//! [`SyncContext`] is the entry point; everything else is reachable from it.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod models;
pub mod store;
pub mod sync;

pub use api::{ApiClient, ApiError, Backend, SearchQuery, SearchResult};
pub use config::{Config, SyncSettings};
pub use context::{AggregateData, CacheReport, Mutation, StatsReport, SyncContext};
pub use error::{Result, SyncError};
pub use events::{DomainEvent, Entity, EventBus, EventName, Subscription};
pub use store::{Category, StoreState};
pub use sync::LoadHandle;

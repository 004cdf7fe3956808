//! REST API module for the pharmacy backend.
//!
//! This module provides the `Backend` contract the synchronization layer
//! consumes, the `ApiClient` HTTP implementation of it, and the boundary
//! types (`Envelope`, `SearchResult<T>`, `Pagination`) that turn the API's
//! JSON envelopes into typed values.

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::{Aggregate, Backend};
pub use client::{ApiClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use types::{Envelope, Pagination, ResultOrigin, SearchQuery, SearchResult, DEFAULT_PAGE_SIZE};

use async_trait::async_trait;
use serde_json::Value;

use super::types::{Envelope, SearchQuery};
use super::ApiError;
use crate::store::Category;

/// Dashboard aggregates, each fetched by its own call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Dashboard,
    VentesMensuelles,
    TopMedicaments,
}

impl Aggregate {
    pub const ALL: [Aggregate; 3] = [
        Aggregate::Dashboard,
        Aggregate::VentesMensuelles,
        Aggregate::TopMedicaments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Dashboard => "dashboard",
            Aggregate::VentesMensuelles => "ventes-mensuelles",
            Aggregate::TopMedicaments => "top-medicaments",
        }
    }
}

impl std::fmt::Display for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The remote contract the synchronization layer consumes.
///
/// Implementations only move envelopes; decoding into typed results happens
/// in [`Envelope`]. `ApiClient` is the HTTP implementation; tests plug in an
/// in-memory one.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn search(&self, category: Category, query: &SearchQuery) -> Result<Envelope, ApiError>;

    async fn create(&self, category: Category, data: Value) -> Result<Envelope, ApiError>;

    async fn update(&self, category: Category, id: i64, data: Value) -> Result<Envelope, ApiError>;

    async fn delete(&self, category: Category, id: i64) -> Result<Envelope, ApiError>;

    async fn fetch_aggregate(&self, aggregate: Aggregate) -> Result<Value, ApiError>;

    /// Point the API at another legacy database folder
    async fn select_folder(&self, path: &str) -> Result<Envelope, ApiError>;
}

//! Boundary types between the REST layer and the rest of the crate.
//!
//! The API answers with loosely shaped JSON envelopes
//! (`{success, items|data, pagination, message}`). They are decoded here,
//! once, into `SearchResult<T>` or a typed entity; nothing past this module
//! handles untyped JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// Page size used when a query does not specify one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Message used when the API rejects a call without saying why
const UNKNOWN_API_ERROR: &str = "Erreur inconnue du serveur";

/// Parameters of a paginated, filtered search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub term: String,
    pub filter: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            term: String::new(),
            filter: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchQuery {
    pub fn term(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Same query with the term trimmed and lower-cased and an empty filter dropped
    pub fn normalized(&self) -> Self {
        let filter = self
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        Self {
            term: self.term.trim().to_lowercase(),
            filter,
            page: self.page.max(1),
            page_size: self.page_size.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Pagination {
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items_per_page: u32,
}

impl Pagination {
    /// Pagination describing a single page holding `len` items
    pub fn single_page(len: usize) -> Self {
        Self {
            current_page: 1,
            total_pages: if len == 0 { 0 } else { 1 },
            total_items: len as u64,
            items_per_page: len as u32,
        }
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// Where a search result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    #[default]
    Network,
    Cache,
    /// Duplicate or superseded request; the result is the empty sentinel
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    #[serde(skip)]
    pub origin: ResultOrigin,
}

impl<T> SearchResult<T> {
    pub fn new(items: Vec<T>, pagination: Pagination) -> Self {
        Self {
            items,
            pagination,
            origin: ResultOrigin::Network,
        }
    }

    /// Empty-result sentinel returned for suppressed requests
    pub fn suppressed() -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::default(),
            origin: ResultOrigin::Suppressed,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.origin == ResultOrigin::Suppressed
    }
}

/// Raw API envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "items", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn page(items: Value, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(items),
            pagination: Some(pagination),
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Fail with the API message unless `success` is set
    pub fn ensure_success(self) -> Result<Self, ApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(ApiError::Rejected(
                self.message.unwrap_or_else(|| UNKNOWN_API_ERROR.to_string()),
            ))
        }
    }

    pub fn into_search<T: DeserializeOwned>(self) -> Result<SearchResult<T>, ApiError> {
        let envelope = self.ensure_success()?;
        let items: Vec<T> = match envelope.data {
            Some(Value::Null) | None => Vec::new(),
            Some(data) => serde_json::from_value(data)
                .map_err(|e| ApiError::InvalidResponse(format!("search items: {}", e)))?,
        };
        let pagination = envelope
            .pagination
            .unwrap_or_else(|| Pagination::single_page(items.len()));
        Ok(SearchResult::new(items, pagination))
    }

    pub fn into_entity<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let envelope = self.ensure_success()?;
        let data = envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("missing data in mutation response".into()))?;
        serde_json::from_value(data).map_err(|e| ApiError::InvalidResponse(format!("entity: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_query() {
        let query = SearchQuery::term("  DoLi ").with_filter("  ").with_page(0);
        let normalized = query.normalized();
        assert_eq!(normalized.term, "doli");
        assert_eq!(normalized.filter, None);
        assert_eq!(normalized.page, 1);
    }

    #[test]
    fn test_into_search_with_pagination() {
        let envelope: Envelope = serde_json::from_value(json!({
            "success": true,
            "items": [{"code": "A1", "designation": "Doliprane"}],
            "pagination": {"current_page": 1, "total_pages": 3, "total_items": 41, "items_per_page": 20}
        }))
        .expect("envelope parses");

        let result: SearchResult<crate::models::Article> = envelope.into_search().expect("search decodes");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.pagination.total_items, 41);
        assert!(result.pagination.has_next());
        assert_eq!(result.origin, ResultOrigin::Network);
    }

    #[test]
    fn test_into_search_without_pagination() {
        let envelope = Envelope::ok(json!([{"code": "F1", "libelle": "Antalgiques"}]));
        let result: SearchResult<crate::models::Famille> = envelope.into_search().expect("decodes");
        assert_eq!(result.pagination, Pagination::single_page(1));
    }

    #[test]
    fn test_rejected_envelope_surfaces_message() {
        let err = Envelope::rejected("Base non sélectionnée")
            .into_entity::<crate::models::Medecin>()
            .unwrap_err();
        assert_eq!(err.to_string(), "Base non sélectionnée");

        let err = Envelope::default().ensure_success().unwrap_err();
        assert_eq!(err.to_string(), UNKNOWN_API_ERROR);
    }

    #[test]
    fn test_into_entity_requires_data() {
        let envelope = Envelope {
            success: true,
            ..Default::default()
        };
        assert!(matches!(
            envelope.into_entity::<crate::models::Medecin>(),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}

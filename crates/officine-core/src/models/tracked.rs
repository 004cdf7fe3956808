use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// An entity as held in the store, with its optimistic-mutation state.
///
/// `is_optimistic` means the server has not confirmed this version yet;
/// `is_loading` means a mutation for it is in flight. Views should disable
/// edit actions on records that are loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracked<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(rename = "isOptimistic")]
    pub is_optimistic: bool,
    #[serde(rename = "isLoading")]
    pub is_loading: bool,
}

impl<T> Tracked<T> {
    /// A record confirmed by the server
    pub fn confirmed(item: T) -> Self {
        Self {
            item,
            is_optimistic: false,
            is_loading: false,
        }
    }

    /// A locally applied, not yet confirmed record
    pub fn pending(item: T) -> Self {
        Self {
            item,
            is_optimistic: true,
            is_loading: true,
        }
    }

    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Medecin;

    #[test]
    fn test_flags_serialize_alongside_entity_fields() {
        let medecin = Medecin {
            id: 7,
            nom: "Martin".to_string(),
            prenom: None,
            specialite: None,
            telephone: None,
            adresse: None,
        };
        let json = serde_json::to_value(Tracked::pending(medecin)).expect("serializes");
        assert_eq!(json["id"], 7);
        assert_eq!(json["isOptimistic"], true);
        assert_eq!(json["isLoading"], true);
    }
}

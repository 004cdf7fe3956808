//! # Domain Events
//!
//! The closed catalogue of notifications broadcast on the event bus.
//! Each event name carries exactly one payload shape.

use serde::{Deserialize, Serialize};

use crate::models::{Medecin, Medicament, Ordonnance};
use crate::store::Category;

/// A mutable entity, as carried by entity events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "lowercase")]
pub enum Entity {
    Ordonnance(Ordonnance),
    Medicament(Medicament),
    Medecin(Medecin),
}

impl Entity {
    pub fn category(&self) -> Category {
        match self {
            Entity::Ordonnance(_) => Category::Ordonnances,
            Entity::Medicament(_) => Category::Medicaments,
            Entity::Medecin(_) => Category::Medecins,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Ordonnance(o) => o.id,
            Entity::Medicament(m) => m.id,
            Entity::Medecin(m) => m.id,
        }
    }
}

/// All events that can be published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A create was confirmed by the server
    EntityCreated(Entity),
    /// An update was confirmed by the server
    EntityUpdated(Entity),
    /// A delete was confirmed; carries the removed record for dependent views
    EntityDeleted(Entity),
    /// Dashboard aggregates are out of date
    StatsRefreshNeeded,
    /// Something in the category changed; catch-all for coarse listeners
    DataChanged(Category),
}

impl DomainEvent {
    pub fn name(&self) -> EventName {
        match self {
            DomainEvent::EntityCreated(_) => EventName::EntityCreated,
            DomainEvent::EntityUpdated(_) => EventName::EntityUpdated,
            DomainEvent::EntityDeleted(_) => EventName::EntityDeleted,
            DomainEvent::StatsRefreshNeeded => EventName::StatsRefreshNeeded,
            DomainEvent::DataChanged(_) => EventName::DataChanged,
        }
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self {
            DomainEvent::EntityCreated(e) | DomainEvent::EntityUpdated(e) | DomainEvent::EntityDeleted(e) => Some(e),
            DomainEvent::StatsRefreshNeeded | DomainEvent::DataChanged(_) => None,
        }
    }
}

/// Subscription key: the name of an event without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    StatsRefreshNeeded,
    DataChanged,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medecin() -> Medecin {
        Medecin {
            id: 12,
            nom: "Bernard".to_string(),
            prenom: None,
            specialite: Some("Pédiatrie".to_string()),
            telephone: None,
            adresse: None,
        }
    }

    #[test]
    fn test_event_names() {
        let created = DomainEvent::EntityCreated(Entity::Medecin(medecin()));
        assert_eq!(created.name(), EventName::EntityCreated);
        assert_eq!(created.entity().map(Entity::id), Some(12));
        assert_eq!(created.entity().map(Entity::category), Some(Category::Medecins));

        assert_eq!(DomainEvent::StatsRefreshNeeded.name(), EventName::StatsRefreshNeeded);
        assert!(DomainEvent::DataChanged(Category::Articles).entity().is_none());
    }

    #[test]
    fn test_entity_serializes_tagged() {
        let json = serde_json::to_value(Entity::Medecin(medecin())).expect("serializes");
        assert_eq!(json["type"], "medecin");
        assert_eq!(json["record"]["id"], 12);
    }
}

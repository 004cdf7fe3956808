//! How each entity type plugs into the store, the caches and the bus.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::category::Category;
use super::state::StoreState;
use crate::api::SearchResult;
use crate::cache::{SearchCache, SearchCaches};
use crate::error::SyncError;
use crate::events::Entity;
use crate::models::{
    Article, Medecin, MedecinDraft, Medicament, MedicamentDraft, Ordonnance, OrdonnanceDraft,
    Tracked, UNKNOWN_MEDECIN,
};

/// A searchable resource with its own cache and store collection.
pub trait Resource: Clone + Send + Sync + DeserializeOwned + 'static {
    const CATEGORY: Category;

    fn cache(caches: &SearchCaches) -> &Mutex<SearchCache<Self>>;

    /// Replace the store collection with a page of results. Records in
    /// `hidden` (pending deletes) stay out of the collection.
    fn install(state: &mut StoreState, result: &SearchResult<Self>, hidden: &HashSet<i64>);
}

/// A resource the console can create, update and delete optimistically.
pub trait Mutable: Resource + Serialize + PartialEq {
    type Draft: Serialize + Clone + Send + Sync;

    fn id(&self) -> i64;

    fn collection(state: &StoreState) -> &Arc<Vec<Tracked<Self>>>;

    fn collection_mut(state: &mut StoreState) -> &mut Arc<Vec<Tracked<Self>>>;

    fn validate_create(draft: &Self::Draft) -> Result<(), SyncError>;

    fn validate_update(_draft: &Self::Draft) -> Result<(), SyncError> {
        Ok(())
    }

    /// Best-effort display version of a record that does not exist yet
    fn project(draft: &Self::Draft, temp_id: i64, state: &StoreState) -> Self;

    /// Merge the provided draft fields and recompute derived ones
    fn apply(&mut self, draft: &Self::Draft, state: &StoreState);

    /// Natural ordering of the collection, used when re-inserting a record
    fn natural_order(a: &Self, b: &Self) -> Ordering;

    fn into_entity(self) -> Entity;

    fn from_entity(entity: Entity) -> Option<Self>;
}

/// Install confirmed results while keeping records with a mutation in flight.
///
/// Unconfirmed creates stay at the head. A record with an update in flight
/// keeps its pending version, at the position the new page gives it.
fn install_tracked<T: Mutable>(state: &mut StoreState, items: &[T], hidden: &HashSet<i64>) {
    let collection = T::collection_mut(state);
    let mut updating: HashMap<i64, Tracked<T>> = collection
        .iter()
        .filter(|t| t.is_loading && t.item.id() > 0)
        .map(|t| (t.item.id(), t.clone()))
        .collect();
    let mut next: Vec<Tracked<T>> = collection
        .iter()
        .filter(|t| t.is_loading && t.item.id() < 0)
        .cloned()
        .collect();

    next.extend(
        items
            .iter()
            .filter(|item| !hidden.contains(&item.id()))
            .map(|item| updating.remove(&item.id()).unwrap_or_else(|| Tracked::confirmed(item.clone()))),
    );
    *collection = Arc::new(next);
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn require(value: &Option<String>, message: &str) -> Result<(), SyncError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(SyncError::Validation(message.to_string())),
    }
}

// ===== Articles =====

impl Resource for Article {
    const CATEGORY: Category = Category::Articles;

    fn cache(caches: &SearchCaches) -> &Mutex<SearchCache<Self>> {
        &caches.articles
    }

    fn install(state: &mut StoreState, result: &SearchResult<Self>, _hidden: &HashSet<i64>) {
        state.articles = Arc::new(result.items.clone());
        state.articles_pagination = result.pagination;
    }
}

// ===== Medicaments =====

impl Resource for Medicament {
    const CATEGORY: Category = Category::Medicaments;

    fn cache(caches: &SearchCaches) -> &Mutex<SearchCache<Self>> {
        &caches.medicaments
    }

    fn install(state: &mut StoreState, result: &SearchResult<Self>, hidden: &HashSet<i64>) {
        install_tracked(state, &result.items, hidden);
    }
}

impl Mutable for Medicament {
    type Draft = MedicamentDraft;

    fn id(&self) -> i64 {
        self.id
    }

    fn collection(state: &StoreState) -> &Arc<Vec<Tracked<Self>>> {
        &state.medicaments
    }

    fn collection_mut(state: &mut StoreState) -> &mut Arc<Vec<Tracked<Self>>> {
        &mut state.medicaments
    }

    fn validate_create(draft: &MedicamentDraft) -> Result<(), SyncError> {
        require(&draft.designation, "La désignation du médicament est obligatoire")
    }

    fn validate_update(draft: &MedicamentDraft) -> Result<(), SyncError> {
        if draft.designation.is_some() {
            require(&draft.designation, "La désignation du médicament est obligatoire")?;
        }
        Ok(())
    }

    fn project(draft: &MedicamentDraft, temp_id: i64, _state: &StoreState) -> Self {
        let mut medicament = Medicament {
            id: temp_id,
            designation: String::new(),
            dci: None,
            forme: None,
            dosage: None,
            prix: None,
        };
        draft.merge_into(&mut medicament);
        medicament
    }

    fn apply(&mut self, draft: &MedicamentDraft, _state: &StoreState) {
        draft.merge_into(self);
    }

    fn natural_order(a: &Self, b: &Self) -> Ordering {
        a.designation.to_lowercase().cmp(&b.designation.to_lowercase())
    }

    fn into_entity(self) -> Entity {
        Entity::Medicament(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Medicament(m) => Some(m),
            _ => None,
        }
    }
}

// ===== Medecins =====

impl Resource for Medecin {
    const CATEGORY: Category = Category::Medecins;

    fn cache(caches: &SearchCaches) -> &Mutex<SearchCache<Self>> {
        &caches.medecins
    }

    fn install(state: &mut StoreState, result: &SearchResult<Self>, hidden: &HashSet<i64>) {
        install_tracked(state, &result.items, hidden);
    }
}

impl Mutable for Medecin {
    type Draft = MedecinDraft;

    fn id(&self) -> i64 {
        self.id
    }

    fn collection(state: &StoreState) -> &Arc<Vec<Tracked<Self>>> {
        &state.medecins
    }

    fn collection_mut(state: &mut StoreState) -> &mut Arc<Vec<Tracked<Self>>> {
        &mut state.medecins
    }

    fn validate_create(draft: &MedecinDraft) -> Result<(), SyncError> {
        require(&draft.nom, "Le nom du médecin est obligatoire")
    }

    fn validate_update(draft: &MedecinDraft) -> Result<(), SyncError> {
        if draft.nom.is_some() {
            require(&draft.nom, "Le nom du médecin est obligatoire")?;
        }
        Ok(())
    }

    fn project(draft: &MedecinDraft, temp_id: i64, _state: &StoreState) -> Self {
        let mut medecin = Medecin {
            id: temp_id,
            nom: String::new(),
            prenom: None,
            specialite: None,
            telephone: None,
            adresse: None,
        };
        draft.merge_into(&mut medecin);
        medecin
    }

    fn apply(&mut self, draft: &MedecinDraft, _state: &StoreState) {
        draft.merge_into(self);
    }

    fn natural_order(a: &Self, b: &Self) -> Ordering {
        a.nom
            .to_lowercase()
            .cmp(&b.nom.to_lowercase())
            .then_with(|| a.prenom.cmp(&b.prenom))
    }

    fn into_entity(self) -> Entity {
        Entity::Medecin(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Medecin(m) => Some(m),
            _ => None,
        }
    }
}

// ===== Ordonnances =====

impl Resource for Ordonnance {
    const CATEGORY: Category = Category::Ordonnances;

    fn cache(caches: &SearchCaches) -> &Mutex<SearchCache<Self>> {
        &caches.ordonnances
    }

    fn install(state: &mut StoreState, result: &SearchResult<Self>, hidden: &HashSet<i64>) {
        install_tracked(state, &result.items, hidden);
    }
}

impl Mutable for Ordonnance {
    type Draft = OrdonnanceDraft;

    fn id(&self) -> i64 {
        self.id
    }

    fn collection(state: &StoreState) -> &Arc<Vec<Tracked<Self>>> {
        &state.ordonnances
    }

    fn collection_mut(state: &mut StoreState) -> &mut Arc<Vec<Tracked<Self>>> {
        &mut state.ordonnances
    }

    fn validate_create(draft: &OrdonnanceDraft) -> Result<(), SyncError> {
        draft.validate_for_create()
    }

    fn validate_update(draft: &OrdonnanceDraft) -> Result<(), SyncError> {
        draft.validate_for_update()
    }

    fn project(draft: &OrdonnanceDraft, temp_id: i64, state: &StoreState) -> Self {
        let mut ordonnance = Ordonnance {
            id: temp_id,
            numero_ordonnance: String::new(),
            date_ordonnance: today(),
            medecin_id: None,
            medecin_nom: None,
            patient_nom: None,
            medicaments: Vec::new(),
            nb_medicaments: 0,
        };
        ordonnance.apply(draft, state);
        ordonnance
    }

    fn apply(&mut self, draft: &OrdonnanceDraft, state: &StoreState) {
        let medecin_changed = draft.medecin_id.is_some() && draft.medecin_id != self.medecin_id;
        draft.merge_into(self);
        if medecin_changed || self.medecin_nom.is_none() {
            self.medecin_nom = Some(
                self.medecin_id
                    .and_then(|id| state.medecin(id))
                    .map(Medecin::full_name)
                    .unwrap_or_else(|| UNKNOWN_MEDECIN.to_string()),
            );
        }
    }

    /// Most recent first, then highest id first
    fn natural_order(a: &Self, b: &Self) -> Ordering {
        b.date_ordonnance
            .cmp(&a.date_ordonnance)
            .then_with(|| b.id.cmp(&a.id))
    }

    fn into_entity(self) -> Entity {
        Entity::Ordonnance(self)
    }

    fn from_entity(entity: Entity) -> Option<Self> {
        match entity {
            Entity::Ordonnance(o) => Some(o),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Pagination;
    use crate::models::LigneOrdonnance;

    fn medecin(id: i64, nom: &str) -> Medecin {
        Medecin {
            id,
            nom: nom.to_string(),
            prenom: None,
            specialite: None,
            telephone: None,
            adresse: None,
        }
    }

    fn ordonnance(id: i64, date: &str) -> Ordonnance {
        Ordonnance {
            id,
            numero_ordonnance: format!("ORD-{}", id),
            date_ordonnance: date.to_string(),
            medecin_id: None,
            medecin_nom: None,
            patient_nom: None,
            medicaments: Vec::new(),
            nb_medicaments: 0,
        }
    }

    #[test]
    fn test_projection_resolves_known_medecin() {
        let mut state = StoreState::default();
        state.medecins = Arc::new(vec![Tracked::confirmed(medecin(7, "Martin"))]);

        let draft = OrdonnanceDraft {
            numero: Some("ORD-1".into()),
            medecin_id: Some(7),
            medicaments: Some(vec![LigneOrdonnance {
                medicament_id: None,
                designation: "Paracetamol".into(),
                quantite: 2,
                posologie: None,
            }]),
            ..Default::default()
        };
        let projected = Ordonnance::project(&draft, -1, &state);
        assert_eq!(projected.id, -1);
        assert_eq!(projected.numero_ordonnance, "ORD-1");
        assert_eq!(projected.medecin_nom.as_deref(), Some("Dr Martin"));
        assert_eq!(projected.nb_medicaments, 1);
        assert_eq!(projected.date_ordonnance.len(), 10);
    }

    #[test]
    fn test_projection_uses_placeholder_for_unknown_medecin() {
        let draft = OrdonnanceDraft {
            numero: Some("ORD-2".into()),
            medecin_id: Some(99),
            ..Default::default()
        };
        let projected = Ordonnance::project(&draft, -2, &StoreState::default());
        assert_eq!(projected.medecin_nom.as_deref(), Some(UNKNOWN_MEDECIN));
    }

    #[test]
    fn test_ordonnances_sort_newest_first() {
        let a = ordonnance(1, "2024-01-10");
        let b = ordonnance(2, "2024-03-02");
        assert_eq!(Ordonnance::natural_order(&b, &a), Ordering::Less);
        assert_eq!(Ordonnance::natural_order(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_install_keeps_pending_and_hides_pending_deletes() {
        let mut state = StoreState::default();
        state.medecins = Arc::new(vec![
            Tracked::pending(medecin(-1, "Nouveau")),
            Tracked::confirmed(medecin(3, "Ancien")),
        ]);

        let result = SearchResult::new(
            vec![medecin(3, "Ancien"), medecin(4, "Durand"), medecin(5, "Supprimé")],
            Pagination::single_page(3),
        );
        let hidden: HashSet<i64> = [5].into_iter().collect();
        Medecin::install(&mut state, &result, &hidden);

        let ids: Vec<i64> = state.medecins.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![-1, 3, 4]);
        assert!(state.medecins[0].is_optimistic);
        assert!(!state.medecins[1].is_optimistic);
    }

    #[test]
    fn test_install_keeps_updating_record_in_place() {
        let mut state = StoreState::default();
        let mut edited = medecin(4, "Durand");
        edited.specialite = Some("Cardiologie".into());
        state.medecins = Arc::new(vec![
            Tracked::pending(medecin(-1, "Nouveau")),
            Tracked::confirmed(medecin(3, "Ancien")),
            Tracked::pending(edited),
        ]);

        let result = SearchResult::new(
            vec![medecin(2, "Blanc"), medecin(3, "Ancien"), medecin(4, "Durand"), medecin(6, "Petit")],
            Pagination::single_page(4),
        );
        Medecin::install(&mut state, &result, &HashSet::new());

        let ids: Vec<i64> = state.medecins.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![-1, 2, 3, 4, 6]);
        assert!(state.medecins[3].is_loading);
        assert_eq!(state.medecins[3].specialite.as_deref(), Some("Cardiologie"));
        assert!(!state.medecins[4].is_loading);
    }

    #[test]
    fn test_entity_conversion_is_type_checked() {
        let entity = medecin(1, "Martin").into_entity();
        assert!(Medicament::from_entity(entity.clone()).is_none());
        assert_eq!(Medecin::from_entity(entity).map(|m| m.id), Some(1));
    }

    #[test]
    fn test_create_validation_requires_name() {
        assert!(Medecin::validate_create(&MedecinDraft::default()).is_err());
        assert!(Medicament::validate_create(&MedicamentDraft {
            designation: Some("Smecta".into()),
            ..Default::default()
        })
        .is_ok());
    }
}

//! Data models for pharmacy entities.
//!
//! This module contains the data structures used to represent the
//! legacy pharmacy database as exposed by the REST API:
//!
//! - `Article`, `Famille`: stock lookup and its family filter
//! - `Medicament`, `Medecin`: medication and doctor records (CRUD)
//! - `Ordonnance`, `LigneOrdonnance`: prescriptions (CRUD)
//! - Statistics: `DashboardCounts`, `MonthlySale`, `TopMedication`
//! - `Tracked<T>`: an entity with its optimistic-mutation flags

pub mod article;
pub mod medecin;
pub mod medicament;
pub mod ordonnance;
pub mod stats;
pub mod tracked;

pub use article::{Article, Famille};
pub use medecin::{Medecin, MedecinDraft};
pub use medicament::{Medicament, MedicamentDraft};
pub use ordonnance::{LigneOrdonnance, Ordonnance, OrdonnanceDraft, UNKNOWN_MEDECIN};
pub use stats::{DashboardCounts, MonthlySale, Statistiques, TopMedication};
pub use tracked::Tracked;

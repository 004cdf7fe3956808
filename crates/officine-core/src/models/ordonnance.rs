use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Placeholder shown for the prescriber while the doctor list is still loading
pub const UNKNOWN_MEDECIN: &str = "Médecin inconnu";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct LigneOrdonnance {
    #[serde(default)]
    pub medicament_id: Option<i64>,
    pub designation: String,
    pub quantite: u32,
    #[serde(default)]
    pub posologie: Option<String>,
}

/// A prescription as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Ordonnance {
    #[serde(default)]
    pub id: i64,
    pub numero_ordonnance: String,
    /// ISO date (`YYYY-MM-DD`), the natural ordering key
    #[serde(default, alias = "date")]
    pub date_ordonnance: String,
    #[serde(default)]
    pub medecin_id: Option<i64>,
    #[serde(default)]
    pub medecin_nom: Option<String>,
    #[serde(default)]
    pub patient_nom: Option<String>,
    #[serde(default)]
    pub medicaments: Vec<LigneOrdonnance>,
    #[serde(default)]
    pub nb_medicaments: usize,
}

impl Ordonnance {
    /// Recompute derived fields after the medication lines changed
    pub fn recompute(&mut self) {
        self.nb_medicaments = self.medicaments.len();
    }

    pub fn total_quantite(&self) -> u32 {
        self.medicaments.iter().map(|l| l.quantite).sum()
    }
}

/// Prescription form data.
///
/// On create `numero`, `medecin_id` and at least one medication line are
/// required. On update only the provided fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct OrdonnanceDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numero: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medecin_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_nom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medicaments: Option<Vec<LigneOrdonnance>>,
}

impl OrdonnanceDraft {
    pub fn validate_for_create(&self) -> Result<(), SyncError> {
        match self.numero.as_deref() {
            Some(n) if !n.trim().is_empty() => {}
            _ => return Err(SyncError::Validation("Le numéro d'ordonnance est obligatoire".into())),
        }
        if self.medecin_id.is_none() {
            return Err(SyncError::Validation("Le médecin prescripteur est obligatoire".into()));
        }
        match self.medicaments {
            Some(ref lignes) if !lignes.is_empty() => Self::validate_lignes(lignes),
            _ => Err(SyncError::Validation("Au moins un médicament est requis".into())),
        }
    }

    pub fn validate_for_update(&self) -> Result<(), SyncError> {
        if let Some(ref numero) = self.numero {
            if numero.trim().is_empty() {
                return Err(SyncError::Validation("Le numéro d'ordonnance est obligatoire".into()));
            }
        }
        match self.medicaments {
            Some(ref lignes) if lignes.is_empty() => {
                Err(SyncError::Validation("Au moins un médicament est requis".into()))
            }
            Some(ref lignes) => Self::validate_lignes(lignes),
            None => Ok(()),
        }
    }

    fn validate_lignes(lignes: &[LigneOrdonnance]) -> Result<(), SyncError> {
        for (i, ligne) in lignes.iter().enumerate() {
            if ligne.designation.trim().is_empty() {
                return Err(SyncError::Validation(format!("Ligne {}: désignation manquante", i + 1)));
            }
            if ligne.quantite == 0 {
                return Err(SyncError::Validation(format!("Ligne {}: quantité invalide", i + 1)));
            }
        }
        Ok(())
    }

    pub fn merge_into(&self, target: &mut Ordonnance) {
        if let Some(ref numero) = self.numero {
            target.numero_ordonnance = numero.clone();
        }
        if let Some(ref date) = self.date {
            target.date_ordonnance = date.clone();
        }
        if self.medecin_id.is_some() {
            target.medecin_id = self.medecin_id;
        }
        if self.patient_nom.is_some() {
            target.patient_nom = self.patient_nom.clone();
        }
        if let Some(ref lignes) = self.medicaments {
            target.medicaments = lignes.clone();
        }
        target.recompute();
    }
}

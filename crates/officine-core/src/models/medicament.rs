use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Medicament {
    #[serde(default)]
    pub id: i64,
    pub designation: String,
    #[serde(default)]
    pub dci: Option<String>,
    #[serde(default)]
    pub forme: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub prix: Option<f64>,
}

impl Medicament {
    /// Designation followed by dosage and form when known, e.g. "Doliprane 500mg (comprimé)"
    pub fn display_name(&self) -> String {
        let mut name = self.designation.clone();
        if let Some(ref dosage) = self.dosage {
            name.push(' ');
            name.push_str(dosage);
        }
        if let Some(ref forme) = self.forme {
            name.push_str(&format!(" ({})", forme));
        }
        name
    }
}

/// Form data for creating or editing a medication.
///
/// Every field is optional so an edit only carries what changed; a create
/// requires `designation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MedicamentDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dci: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prix: Option<f64>,
}

impl MedicamentDraft {
    pub fn merge_into(&self, target: &mut Medicament) {
        if let Some(ref designation) = self.designation {
            target.designation = designation.clone();
        }
        if self.dci.is_some() {
            target.dci = self.dci.clone();
        }
        if self.forme.is_some() {
            target.forme = self.forme.clone();
        }
        if self.dosage.is_some() {
            target.dosage = self.dosage.clone();
        }
        if self.prix.is_some() {
            target.prix = self.prix;
        }
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Medecin {
    #[serde(default)]
    pub id: i64,
    pub nom: String,
    #[serde(default)]
    pub prenom: Option<String>,
    #[serde(default)]
    pub specialite: Option<String>,
    #[serde(default)]
    pub telephone: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
}

impl Medecin {
    /// "Dr Prénom Nom", or "Dr Nom" when the first name is unknown
    pub fn full_name(&self) -> String {
        match self.prenom.as_deref() {
            Some(prenom) if !prenom.trim().is_empty() => format!("Dr {} {}", prenom, self.nom),
            _ => format!("Dr {}", self.nom),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MedecinDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prenom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adresse: Option<String>,
}

impl MedecinDraft {
    pub fn merge_into(&self, target: &mut Medecin) {
        if let Some(ref nom) = self.nom {
            target.nom = nom.clone();
        }
        if self.prenom.is_some() {
            target.prenom = self.prenom.clone();
        }
        if self.specialite.is_some() {
            target.specialite = self.specialite.clone();
        }
        if self.telephone.is_some() {
            target.telephone = self.telephone.clone();
        }
        if self.adresse.is_some() {
            target.adresse = self.adresse.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let mut medecin = Medecin {
            id: 7,
            nom: "Martin".to_string(),
            prenom: Some("Claire".to_string()),
            specialite: None,
            telephone: None,
            adresse: None,
        };
        assert_eq!(medecin.full_name(), "Dr Claire Martin");

        medecin.prenom = Some("  ".to_string());
        assert_eq!(medecin.full_name(), "Dr Martin");
    }
}

use serde::{Deserialize, Serialize};

/// Headline counts for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DashboardCounts {
    #[serde(default)]
    pub total_articles: u64,
    #[serde(default)]
    pub total_medicaments: u64,
    #[serde(default)]
    pub total_medecins: u64,
    #[serde(default)]
    pub total_ordonnances: u64,
    #[serde(default)]
    pub ordonnances_mois: u64,
    #[serde(default)]
    pub articles_stock_faible: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MonthlySale {
    /// `YYYY-MM`
    pub mois: String,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub nb_ventes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TopMedication {
    pub designation: String,
    #[serde(default)]
    pub quantite: u64,
}

/// The three independently fetched dashboard aggregates.
///
/// Each part stays `None` until its own fetch succeeds, so one failing
/// aggregate does not hide the other two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Statistiques {
    pub dashboard: Option<DashboardCounts>,
    pub ventes_mensuelles: Option<Vec<MonthlySale>>,
    pub top_medicaments: Option<Vec<TopMedication>>,
}

impl Statistiques {
    pub fn is_empty(&self) -> bool {
        self.dashboard.is_none() && self.ventes_mensuelles.is_none() && self.top_medicaments.is_none()
    }

    pub fn total_ventes(&self) -> f64 {
        self.ventes_mensuelles
            .as_ref()
            .map(|v| v.iter().map(|m| m.total).sum())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_defaults_missing_counts() {
        let json = r#"{"total_articles": 1200, "total_ordonnances": 87}"#;
        let counts: DashboardCounts = serde_json::from_str(json).expect("counts should parse");
        assert_eq!(counts.total_articles, 1200);
        assert_eq!(counts.total_medecins, 0);
    }

    #[test]
    fn test_total_ventes() {
        let stats = Statistiques {
            ventes_mensuelles: Some(vec![
                MonthlySale { mois: "2024-01".into(), total: 100.5, nb_ventes: 3 },
                MonthlySale { mois: "2024-02".into(), total: 49.5, nb_ventes: 1 },
            ]),
            ..Default::default()
        };
        assert!(!stats.is_empty());
        assert_eq!(stats.total_ventes(), 150.0);
        assert!(Statistiques::default().is_empty());
    }
}

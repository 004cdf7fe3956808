use serde::{Deserialize, Serialize};

/// A stock article from the legacy pharmacy database.
///
/// Articles are read-only from the console's point of view: they are
/// looked up by search and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Article {
    pub code: String,
    pub designation: String,
    #[serde(default)]
    pub famille: Option<String>,
    #[serde(default)]
    pub prix_achat: Option<f64>,
    #[serde(default)]
    pub prix_vente: Option<f64>,
    #[serde(default)]
    pub stock: Option<f64>,
    #[serde(default)]
    pub stock_min: Option<f64>,
}

impl Article {
    /// True when the article has a minimum stock and sits at or below it
    pub fn is_low_stock(&self) -> bool {
        match (self.stock, self.stock_min) {
            (Some(stock), Some(min)) => stock <= min,
            _ => false,
        }
    }

    pub fn stock_display(&self) -> String {
        match self.stock {
            Some(s) if s.fract() == 0.0 => format!("{}", s as i64),
            Some(s) => format!("{:.2}", s),
            None => "-".to_string(),
        }
    }
}

/// Article family, used as a search filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Famille {
    pub code: String,
    #[serde(alias = "nom")]
    pub libelle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(stock: Option<f64>, stock_min: Option<f64>) -> Article {
        Article {
            code: "A1".to_string(),
            designation: "Doliprane 1000mg".to_string(),
            famille: None,
            prix_achat: None,
            prix_vente: Some(2.18),
            stock,
            stock_min,
        }
    }

    #[test]
    fn test_low_stock() {
        assert!(article(Some(2.0), Some(5.0)).is_low_stock());
        assert!(article(Some(5.0), Some(5.0)).is_low_stock());
        assert!(!article(Some(6.0), Some(5.0)).is_low_stock());
        assert!(!article(Some(0.0), None).is_low_stock());
    }

    #[test]
    fn test_stock_display() {
        assert_eq!(article(Some(12.0), None).stock_display(), "12");
        assert_eq!(article(Some(1.5), None).stock_display(), "1.50");
        assert_eq!(article(None, None).stock_display(), "-");
    }

    #[test]
    fn test_famille_accepts_nom_alias() {
        let json = r#"{"code": "ANT", "nom": "Antalgiques"}"#;
        let famille: Famille = serde_json::from_str(json).expect("famille should parse");
        assert_eq!(famille.libelle, "Antalgiques");
    }
}

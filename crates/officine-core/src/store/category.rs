use serde::{Deserialize, Serialize};

/// Resource categories tracked independently by the store.
///
/// `Initial` is not a remote resource: it tracks the first two stages of
/// the staged load (families and the first article page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Initial,
    Familles,
    Articles,
    Medicaments,
    Medecins,
    Ordonnances,
    Statistiques,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Initial,
        Category::Familles,
        Category::Articles,
        Category::Medicaments,
        Category::Medecins,
        Category::Ordonnances,
        Category::Statistiques,
    ];

    /// Path segment of the REST resource
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Initial => "initial",
            Category::Familles => "familles",
            Category::Articles => "articles",
            Category::Medicaments => "medicaments",
            Category::Medecins => "medecins",
            Category::Ordonnances => "ordonnances",
            Category::Statistiques => "statistiques",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-category "currently loading" booleans, for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingFlags {
    pub initial: bool,
    pub familles: bool,
    pub articles: bool,
    pub medicaments: bool,
    pub medecins: bool,
    pub ordonnances: bool,
    pub statistiques: bool,
}

impl LoadingFlags {
    fn slot(&mut self, category: Category) -> &mut bool {
        match category {
            Category::Initial => &mut self.initial,
            Category::Familles => &mut self.familles,
            Category::Articles => &mut self.articles,
            Category::Medicaments => &mut self.medicaments,
            Category::Medecins => &mut self.medecins,
            Category::Ordonnances => &mut self.ordonnances,
            Category::Statistiques => &mut self.statistiques,
        }
    }

    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Initial => self.initial,
            Category::Familles => self.familles,
            Category::Articles => self.articles,
            Category::Medicaments => self.medicaments,
            Category::Medecins => self.medecins,
            Category::Ordonnances => self.ordonnances,
            Category::Statistiques => self.statistiques,
        }
    }

    pub fn set(&mut self, category: Category, loading: bool) {
        *self.slot(category) = loading;
    }

    pub fn any(&self) -> bool {
        Category::ALL.iter().any(|c| self.get(*c))
    }
}

/// Per-category last error message; `None` once a later load succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMap {
    pub initial: Option<String>,
    pub familles: Option<String>,
    pub articles: Option<String>,
    pub medicaments: Option<String>,
    pub medecins: Option<String>,
    pub ordonnances: Option<String>,
    pub statistiques: Option<String>,
}

impl ErrorMap {
    fn slot(&mut self, category: Category) -> &mut Option<String> {
        match category {
            Category::Initial => &mut self.initial,
            Category::Familles => &mut self.familles,
            Category::Articles => &mut self.articles,
            Category::Medicaments => &mut self.medicaments,
            Category::Medecins => &mut self.medecins,
            Category::Ordonnances => &mut self.ordonnances,
            Category::Statistiques => &mut self.statistiques,
        }
    }

    pub fn get(&self, category: Category) -> Option<&str> {
        match category {
            Category::Initial => self.initial.as_deref(),
            Category::Familles => self.familles.as_deref(),
            Category::Articles => self.articles.as_deref(),
            Category::Medicaments => self.medicaments.as_deref(),
            Category::Medecins => self.medecins.as_deref(),
            Category::Ordonnances => self.ordonnances.as_deref(),
            Category::Statistiques => self.statistiques.as_deref(),
        }
    }

    pub fn set(&mut self, category: Category, message: Option<String>) {
        *self.slot(category) = message;
    }
}

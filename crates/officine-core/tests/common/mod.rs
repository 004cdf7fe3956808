//! In-memory stand-in for the pharmacy REST API.
//!
//! Serves a small fixture database, records every call, applies mutations
//! to its own data like the real server would, and can hold requests until
//! the test releases them.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use officine_core::api::{Aggregate, ApiError, Backend, Envelope, Pagination, SearchQuery};
use officine_core::{Category, SyncContext, SyncSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Search(Category, SearchQuery),
    Create(Category),
    Update(Category, i64),
    Delete(Category, i64),
    Aggregate(Aggregate),
    Folder(String),
}

#[derive(Default)]
pub struct MockBackend {
    data: Mutex<HashMap<Category, Vec<Value>>>,
    aggregates: Mutex<HashMap<Aggregate, Value>>,
    calls: Mutex<Vec<Call>>,
    failing_searches: Mutex<HashSet<Category>>,
    failing_aggregates: Mutex<HashSet<Aggregate>>,
    fail_mutations: AtomicBool,
    reject_folder: AtomicBool,
    next_id: AtomicI64,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockBackend {
    /// Two families, 45 articles, three medications, two doctors, three
    /// prescriptions and all three dashboard aggregates
    pub fn pharmacy() -> Arc<Self> {
        let backend = Self::default();
        backend.next_id.store(42, Ordering::SeqCst);

        let articles: Vec<Value> = (1..=45)
            .map(|i| {
                json!({
                    "code": format!("A{:03}", i),
                    "designation": format!("Article {}", i),
                    "famille": if i % 2 == 0 { "ANT" } else { "VIT" },
                    "prix_vente": 2.5,
                    "stock": i,
                    "stock_min": 5,
                })
            })
            .collect();

        let mut data = HashMap::new();
        data.insert(
            Category::Familles,
            vec![
                json!({"code": "ANT", "libelle": "Antalgiques"}),
                json!({"code": "VIT", "libelle": "Vitamines"}),
            ],
        );
        data.insert(Category::Articles, articles);
        data.insert(
            Category::Medicaments,
            vec![
                json!({"id": 1, "designation": "Doliprane", "dci": "Paracetamol", "dosage": "1000mg"}),
                json!({"id": 2, "designation": "Smecta", "forme": "Sachet"}),
                json!({"id": 3, "designation": "Spasfon"}),
            ],
        );
        data.insert(
            Category::Medecins,
            vec![
                json!({"id": 7, "nom": "Martin", "prenom": "Claire", "specialite": "Généraliste"}),
                json!({"id": 8, "nom": "Durand"}),
            ],
        );
        data.insert(
            Category::Ordonnances,
            vec![
                json!({"id": 3, "numero_ordonnance": "ORD-0003", "date_ordonnance": "2024-04-20", "medecin_id": 7, "medecin_nom": "Dr Claire Martin", "nb_medicaments": 1,
                       "medicaments": [{"designation": "Doliprane", "quantite": 1}]}),
                json!({"id": 2, "numero_ordonnance": "ORD-0002", "date_ordonnance": "2024-03-11", "medecin_id": 8, "medecin_nom": "Dr Durand", "nb_medicaments": 0}),
                json!({"id": 1, "numero_ordonnance": "ORD-0001", "date_ordonnance": "2024-01-05", "medecin_id": 7, "nb_medicaments": 0}),
            ],
        );
        *backend.data.lock().unwrap() = data;

        let mut aggregates = HashMap::new();
        aggregates.insert(
            Aggregate::Dashboard,
            json!({"total_articles": 45, "total_medicaments": 3, "total_medecins": 2, "total_ordonnances": 3}),
        );
        aggregates.insert(
            Aggregate::VentesMensuelles,
            json!([{"mois": "2024-03", "total": 1520.5, "nb_ventes": 87}, {"mois": "2024-04", "total": 1710.0, "nb_ventes": 95}]),
        );
        aggregates.insert(
            Aggregate::TopMedicaments,
            json!([{"designation": "Doliprane", "quantite": 130}]),
        );
        *backend.aggregates.lock().unwrap() = aggregates;

        Arc::new(backend)
    }

    // ===== Test controls =====

    /// Park every following request until `release_one` or `release`
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_one(&self) {
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            gate.add_permits(1);
        }
    }

    /// Let every parked and future request through
    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }

    pub fn fail_search(&self, category: Category, fail: bool) {
        let mut failing = self.failing_searches.lock().unwrap();
        if fail {
            failing.insert(category);
        } else {
            failing.remove(&category);
        }
    }

    pub fn fail_aggregate(&self, aggregate: Aggregate) {
        self.failing_aggregates.lock().unwrap().insert(aggregate);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn reject_folder(&self) {
        self.reject_folder.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn search_calls(&self, category: Category) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Search(cat, _) if *cat == category))
            .count()
    }

    pub fn aggregate_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Aggregate(_))).count()
    }

    pub fn records(&self, category: Category) -> Vec<Value> {
        self.data.lock().unwrap().get(&category).cloned().unwrap_or_default()
    }

    // ===== Internals =====

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn medecin_name(&self, id: i64) -> Option<String> {
        let data = self.data.lock().unwrap();
        let medecin = data.get(&Category::Medecins)?.iter().find(|m| m["id"] == id)?;
        let nom = medecin["nom"].as_str()?;
        Some(match medecin["prenom"].as_str() {
            Some(prenom) => format!("Dr {} {}", prenom, nom),
            None => format!("Dr {}", nom),
        })
    }

    /// Server-side shape of a prescription written from a draft
    fn normalize_ordonnance(&self, record: &mut Value) {
        let medecin_nom = record["medecin_id"].as_i64().and_then(|id| self.medecin_name(id));
        if let Some(obj) = record.as_object_mut() {
            if let Some(numero) = obj.remove("numero") {
                obj.insert("numero_ordonnance".into(), numero);
            }
            if let Some(date) = obj.remove("date") {
                obj.insert("date_ordonnance".into(), date);
            }
            obj.entry("date_ordonnance").or_insert_with(|| json!("2024-05-02"));
            let count = obj.get("medicaments").and_then(Value::as_array).map(Vec::len).unwrap_or(0);
            obj.insert("nb_medicaments".into(), json!(count));
            if let Some(nom) = medecin_nom {
                obj.insert("medecin_nom".into(), json!(nom));
            }
        }
    }
}

fn matches_term(item: &Value, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    ["designation", "nom", "numero_ordonnance", "libelle"]
        .iter()
        .filter_map(|field| item[*field].as_str())
        .any(|text| text.to_lowercase().contains(term))
}

#[async_trait]
impl Backend for MockBackend {
    async fn search(&self, category: Category, query: &SearchQuery) -> Result<Envelope, ApiError> {
        self.record(Call::Search(category, query.clone()));
        self.pass_gate().await;
        if self.failing_searches.lock().unwrap().contains(&category) {
            return Err(ApiError::Transport("connexion refusée".into()));
        }

        let term = query.term.trim().to_lowercase();
        let items: Vec<Value> = self
            .records(category)
            .into_iter()
            .filter(|item| matches_term(item, &term))
            .filter(|item| match query.filter.as_deref() {
                Some(famille) => item["famille"] == famille,
                None => true,
            })
            .collect();

        let size = query.page_size.max(1) as usize;
        let page = query.page.max(1) as usize;
        let total = items.len();
        let slice: Vec<Value> = items.into_iter().skip((page - 1) * size).take(size).collect();
        let pagination = Pagination {
            current_page: page as u32,
            total_pages: ((total + size - 1) / size) as u32,
            total_items: total as u64,
            items_per_page: size as u32,
        };
        Ok(Envelope::page(Value::Array(slice), pagination))
    }

    async fn create(&self, category: Category, mut data: Value) -> Result<Envelope, ApiError> {
        self.record(Call::Create(category));
        self.pass_gate().await;
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Ok(Envelope::rejected("Enregistrement refusé"));
        }

        data["id"] = json!(self.next_id.fetch_add(1, Ordering::SeqCst));
        if category == Category::Ordonnances {
            self.normalize_ordonnance(&mut data);
        }
        self.data.lock().unwrap().entry(category).or_default().insert(0, data.clone());
        Ok(Envelope::ok(data))
    }

    async fn update(&self, category: Category, id: i64, data: Value) -> Result<Envelope, ApiError> {
        self.record(Call::Update(category, id));
        self.pass_gate().await;
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("délai dépassé".into()));
        }

        let mut patch = data;
        if category == Category::Ordonnances {
            self.normalize_ordonnance(&mut patch);
        }
        let mut store = self.data.lock().unwrap();
        let record = store
            .get_mut(&category)
            .and_then(|records| records.iter_mut().find(|r| r["id"] == id))
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", category, id)))?;
        if let (Some(target), Some(fields)) = (record.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(Envelope::ok(record.clone()))
    }

    async fn delete(&self, category: Category, id: i64) -> Result<Envelope, ApiError> {
        self.record(Call::Delete(category, id));
        self.pass_gate().await;
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Ok(Envelope::rejected("Suppression impossible"));
        }

        if let Some(records) = self.data.lock().unwrap().get_mut(&category) {
            records.retain(|r| r["id"] != id);
        }
        Ok(Envelope::ok(Value::Null))
    }

    async fn fetch_aggregate(&self, aggregate: Aggregate) -> Result<Value, ApiError> {
        self.record(Call::Aggregate(aggregate));
        self.pass_gate().await;
        if self.failing_aggregates.lock().unwrap().contains(&aggregate) {
            return Err(ApiError::ServerError(format!("{} indisponible", aggregate)));
        }
        Ok(self.aggregates.lock().unwrap().get(&aggregate).cloned().unwrap_or(Value::Null))
    }

    async fn select_folder(&self, path: &str) -> Result<Envelope, ApiError> {
        self.record(Call::Folder(path.to_string()));
        self.pass_gate().await;
        if self.reject_folder.load(Ordering::SeqCst) {
            return Ok(Envelope::rejected("Dossier introuvable"));
        }
        Ok(Envelope::ok(json!({ "path": path })))
    }
}

pub fn context(backend: &Arc<MockBackend>) -> SyncContext {
    SyncContext::new(Arc::clone(backend) as Arc<dyn Backend>, SyncSettings::default())
}

/// Let spawned tasks run until they park
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

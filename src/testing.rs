//! Scripted remote and payload builders shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache_gate::CacheGate;
use crate::catalog::CatalogRecord;
use crate::config::{Config, SharedConfig};
use crate::error::SyncError;
use crate::remote::{CatalogRemote, ListQuery, MetadataKind, RawDetail, RawPage};
use crate::store::{CatalogStore, MemoryStore};
use crate::sync::SyncOrchestrator;

/// A list item with the fields a typical list response carries.
pub fn game_json(id: u64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "released": "2020-01-01",
        "rating": 4.0,
        "background_image": format!("https://media.example/{}.jpg", id),
        "platforms": [{"platform": {"id": 4, "name": "PC"}}],
        "genres": [{"name": "Action"}],
        "stores": [{"store": {"name": "Steam"}}],
        "short_screenshots": [{"image": format!("https://media.example/{}-1.jpg", id)}]
    })
}

/// `count` list items with ids starting at `first_id`.
pub fn games(first_id: u64, count: u64) -> Vec<Value> {
    (first_id..first_id + count)
        .map(|id| game_json(id, &format!("Game {}", id)))
        .collect()
}

/// A detail body naming a concrete developer.
pub fn detail_json(id: u64, name: &str, developer: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description_raw": format!("{} in full detail.", name),
        "developers": [{"name": developer}],
        "publishers": [{"name": "Some Publisher"}]
    })
}

pub fn record(id: &str, name: &str) -> CatalogRecord {
    CatalogRecord::new(id, name)
}

fn page_of(results: Vec<Value>) -> RawPage {
    RawPage {
        count: Some(results.len() as u64),
        results,
        ..RawPage::default()
    }
}

/// `CatalogRemote` answering from scripted responses.
///
/// Unscripted list pages and details answer HTTP 404.
#[derive(Default)]
pub struct FakeRemote {
    pages: Mutex<HashMap<u32, Result<Vec<Value>, SyncError>>>,
    search: Mutex<Option<Result<Vec<Value>, SyncError>>>,
    details: Mutex<HashMap<String, Result<Value, SyncError>>>,
    names: Mutex<HashMap<MetadataKind, Result<Vec<String>, SyncError>>>,
    page_delay: Mutex<Option<Duration>>,
    detail_delay: Mutex<Option<Duration>>,
    queries: Mutex<Vec<ListQuery>>,
    pub list_calls: AtomicUsize,
    search_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    lists_in_flight: AtomicUsize,
    pub max_lists_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_page(&self, page: u32, response: Result<Vec<Value>, SyncError>) {
        self.pages.lock().unwrap().insert(page, response);
    }

    pub fn on_search(&self, response: Result<Vec<Value>, SyncError>) {
        *self.search.lock().unwrap() = Some(response);
    }

    pub fn on_detail(&self, id: &str, response: Result<Value, SyncError>) {
        self.details.lock().unwrap().insert(id.to_string(), response);
    }

    pub fn on_names(&self, kind: MetadataKind, response: Result<Vec<String>, SyncError>) {
        self.names.lock().unwrap().insert(kind, response);
    }

    pub fn delay_pages(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_details(&self, delay: Duration) {
        *self.detail_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_queries(&self) -> Vec<ListQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn detail_count(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogRemote for FakeRemote {
    async fn list_games(&self, query: &ListQuery) -> Result<RawPage, SyncError> {
        query.validate()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        let now = self.lists_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_lists_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.pages.lock().unwrap().get(&query.page).cloned();
        self.lists_in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted
            .unwrap_or_else(|| Err(SyncError::protocol(404)))
            .map(page_of)
    }

    async fn search_games(&self, _query: &str, _page_size: u32) -> Result<RawPage, SyncError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.search.lock().unwrap().clone();
        scripted
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(page_of)
    }

    async fn get_game_detail(&self, id: &str) -> Result<RawDetail, SyncError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.detail_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.details.lock().unwrap().get(id).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        scripted.unwrap_or_else(|| Err(SyncError::protocol(404)))
    }

    async fn list_names(&self, kind: MetadataKind) -> Result<Vec<String>, SyncError> {
        self.names
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Everything an orchestrator test needs, wired with in-memory parts.
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub store: Arc<MemoryStore>,
    pub gate: Arc<CacheGate>,
    pub config: SharedConfig,
    pub sync: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let remote = FakeRemote::new();
        let store = Arc::new(MemoryStore::new());
        let config = SharedConfig::new(config);
        let gate = Arc::new(CacheGate::new(config.clone()));
        let sync = Arc::new(SyncOrchestrator::new(
            remote.clone(),
            store.clone(),
            gate.clone(),
            config.clone(),
        ));
        Self {
            remote,
            store,
            gate,
            config,
            sync,
        }
    }

    pub async fn seed(&self, records: &[CatalogRecord]) {
        self.store.upsert_all(records).await.unwrap();
    }
}

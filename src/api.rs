//! Callback-style entry points for UI code.
//!
//! Each call spawns its work on the runtime and hands the outcome to the
//! caller's callback through the configured [`Dispatcher`]. Freshly fetched
//! lists go through enrichment before delivery; cached and fallback data
//! are delivered as stored.

use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::catalog::{CatalogFilter, CatalogRecord};
use crate::config::SharedConfig;
use crate::dispatch::Dispatcher;
use crate::error::SyncError;
use crate::sync::{
    BulkPopulator, BulkReport, CategoryKind, EnrichmentPipeline, Fetched, PageRequest, Progress,
    Source, SyncOrchestrator, DEFAULT_GENRES,
};

/// Error as a callback sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    /// Stable identifier, see [`SyncError::category`]
    pub category: &'static str,
    pub message: String,
}

impl From<&SyncError> for CallbackError {
    fn from(err: &SyncError) -> Self {
        Self {
            category: err.category(),
            message: err.user_message(),
        }
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.category)
    }
}

pub type ListOutcome = Result<Vec<CatalogRecord>, CallbackError>;
pub type DetailOutcome = Result<CatalogRecord, CallbackError>;

pub struct CatalogService {
    runtime: Handle,
    sync: Arc<SyncOrchestrator>,
    bulk: Arc<BulkPopulator>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl CatalogService {
    pub fn new(runtime: Handle, sync: Arc<SyncOrchestrator>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let bulk = Arc::new(BulkPopulator::new(Arc::clone(&sync)));
        Self {
            runtime,
            sync,
            bulk,
            dispatcher,
        }
    }

    pub fn load_page<C>(&self, page: u32, page_size: u32, filter: CatalogFilter, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(ListOutcome) + Send + 'static,
    {
        let sync = Arc::clone(&self.sync);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.runtime.spawn(async move {
            reload_config(sync.config().clone()).await;
            let request = PageRequest::new(page, page_size, filter);
            let outcome = deliverable(&sync, sync.load_page(&request).await).await;
            dispatcher.dispatch(Box::new(move || callback(outcome)));
        })
    }

    pub fn search<C>(&self, query: &str, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(ListOutcome) + Send + 'static,
    {
        let sync = Arc::clone(&self.sync);
        let dispatcher = Arc::clone(&self.dispatcher);
        let query = query.to_string();
        self.runtime.spawn(async move {
            reload_config(sync.config().clone()).await;
            let outcome = deliverable(&sync, sync.search(&query).await).await;
            dispatcher.dispatch(Box::new(move || callback(outcome)));
        })
    }

    pub fn force_refresh<C>(&self, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(ListOutcome) + Send + 'static,
    {
        let sync = Arc::clone(&self.sync);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.runtime.spawn(async move {
            reload_config(sync.config().clone()).await;
            let outcome = deliverable(&sync, sync.force_refresh().await).await;
            dispatcher.dispatch(Box::new(move || callback(outcome)));
        })
    }

    pub fn get_detail<C>(&self, id: &str, callback: C) -> JoinHandle<()>
    where
        C: FnOnce(DetailOutcome) + Send + 'static,
    {
        let sync = Arc::clone(&self.sync);
        let dispatcher = Arc::clone(&self.dispatcher);
        let id = id.to_string();
        self.runtime.spawn(async move {
            reload_config(sync.config().clone()).await;
            let outcome = sync
                .get_detail(&id)
                .await
                .map(|(record, _)| record)
                .map_err(|e| CallbackError::from(&e));
            dispatcher.dispatch(Box::new(move || callback(outcome)));
        })
    }

    /// Populate pages `1..=pages`, reporting progress after each page.
    pub fn populate_bulk<P, C>(&self, pages: u32, progress: P, completion: C) -> JoinHandle<()>
    where
        P: FnMut(Progress) + Send + 'static,
        C: FnOnce(ListOutcome) + Send + 'static,
    {
        let config = self.sync.config().clone();
        let bulk = Arc::clone(&self.bulk);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.runtime.spawn(async move {
            reload_config(config).await;
            let forward = progress_forwarder(Arc::clone(&dispatcher), progress);
            let outcome = bulk_outcome(bulk.populate_pages(pages, forward).await);
            dispatcher.dispatch(Box::new(move || completion(outcome)));
        })
    }

    /// Populate one page of top-rated games per slug. An empty genre list
    /// means the default genres.
    pub fn populate_categories<P, C>(
        &self,
        kind: CategoryKind,
        slugs: Vec<String>,
        progress: P,
        completion: C,
    ) -> JoinHandle<()>
    where
        P: FnMut(Progress) + Send + 'static,
        C: FnOnce(ListOutcome) + Send + 'static,
    {
        let config = self.sync.config().clone();
        let slugs = if slugs.is_empty() && kind == CategoryKind::Genre {
            DEFAULT_GENRES.iter().map(|s| s.to_string()).collect()
        } else {
            slugs
        };
        let bulk = Arc::clone(&self.bulk);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.runtime.spawn(async move {
            reload_config(config).await;
            let forward = progress_forwarder(Arc::clone(&dispatcher), progress);
            let outcome = bulk_outcome(bulk.populate_categories(kind, &slugs, forward).await);
            dispatcher.dispatch(Box::new(move || completion(outcome)));
        })
    }
}

/// Pick up edits to the config file before starting new work.
async fn reload_config(config: SharedConfig) {
    match tokio::task::spawn_blocking(move || config.reload_if_changed()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("Could not reload config: {:#}", e),
        Err(e) => tracing::warn!("Config reload task failed: {}", e),
    }
}

/// Enrich remote results; cached and fallback lists pass through untouched.
async fn deliverable(sync: &SyncOrchestrator, result: Result<Fetched, SyncError>) -> ListOutcome {
    let fetched = result.map_err(|e| CallbackError::from(&e))?;
    if fetched.source != Source::Remote {
        return Ok(fetched.records);
    }
    let enriched = EnrichmentPipeline::for_orchestrator(sync)
        .enrich(&fetched.records)
        .await;
    match enriched {
        Ok(report) => Ok(report.records),
        Err(e) => {
            tracing::warn!("Enrichment failed, delivering records as fetched: {}", e);
            Ok(fetched.records)
        }
    }
}

fn bulk_outcome(result: Result<BulkReport, SyncError>) -> ListOutcome {
    result
        .map(|report| report.records)
        .map_err(|e| CallbackError::from(&e))
}

fn progress_forwarder<P>(dispatcher: Arc<dyn Dispatcher>, progress: P) -> impl FnMut(Progress) + Send
where
    P: FnMut(Progress) + Send + 'static,
{
    let progress = Arc::new(Mutex::new(progress));
    move |update| {
        let progress = Arc::clone(&progress);
        dispatcher.dispatch(Box::new(move || {
            let mut progress = match progress.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            (*progress)(update);
        }));
    }
}

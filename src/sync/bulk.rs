use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Semaphore};

use super::orchestrator::{PageRequest, SyncOrchestrator};
use crate::catalog::{CatalogFilter, CatalogRecord};
use crate::config::MAX_PAGE_SIZE;
use crate::error::SyncError;

/// Genres fetched when no explicit list is given.
pub const DEFAULT_GENRES: &[&str] = &["action", "adventure", "rpg", "indie", "strategy"];

const MIXED_LIST_SIZE: u32 = 20;
const MIXED_RANDOM_PAGES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryKind {
    Genre,
    Platform,
}

/// Reported after every unit, whether it succeeded or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub items_so_far: usize,
}

/// Outcome of a bulk run that produced at least some data.
#[derive(Debug, Clone)]
pub struct BulkReport {
    /// Union of every successful unit, first occurrence of each id kept
    pub records: Vec<CatalogRecord>,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
enum Unit {
    Page(u32),
    Category(CategoryKind, String),
    Popular,
    Recent,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Page(page) => write!(f, "page {}", page),
            Unit::Category(CategoryKind::Genre, slug) => write!(f, "genre {}", slug),
            Unit::Category(CategoryKind::Platform, slug) => write!(f, "platform {}", slug),
            Unit::Popular => write!(f, "popular"),
            Unit::Recent => write!(f, "recent"),
        }
    }
}

/// Drives many page or category loads with bounded concurrency.
///
/// Workers send their outcome over a channel; a single aggregator owns the
/// accumulator and the completed/failed counters. Partial success is
/// success: only a run where every unit failed reports an error.
pub struct BulkPopulator {
    sync: Arc<SyncOrchestrator>,
}

impl BulkPopulator {
    pub fn new(sync: Arc<SyncOrchestrator>) -> Self {
        Self { sync }
    }

    /// Load pages `1..=pages` of the unfiltered list.
    pub async fn populate_pages<F>(&self, pages: u32, progress: F) -> Result<BulkReport, SyncError>
    where
        F: FnMut(Progress) + Send,
    {
        let units = (1..=pages).map(Unit::Page).collect();
        self.run(units, progress).await
    }

    /// Load the top-rated games of each genre or platform slug.
    pub async fn populate_categories<F>(
        &self,
        kind: CategoryKind,
        slugs: &[String],
        progress: F,
    ) -> Result<BulkReport, SyncError>
    where
        F: FnMut(Progress) + Send,
    {
        let mut units = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let slug = slug.trim();
            if slug.is_empty() {
                return Err(SyncError::InvalidRequest(format!(
                    "Empty {} slug",
                    match kind {
                        CategoryKind::Genre => "genre",
                        CategoryKind::Platform => "platform",
                    }
                )));
            }
            units.push(Unit::Category(kind, slug.to_string()));
        }
        self.run(units, progress).await
    }

    /// Popular, recent and one random early page.
    pub async fn populate_mixed<F>(&self, progress: F) -> Result<BulkReport, SyncError>
    where
        F: FnMut(Progress) + Send,
    {
        let random_page = rand::thread_rng().gen_range(1..=MIXED_RANDOM_PAGES);
        let units = vec![Unit::Popular, Unit::Recent, Unit::Page(random_page)];
        self.run(units, progress).await
    }

    async fn run<F>(&self, units: Vec<Unit>, mut progress: F) -> Result<BulkReport, SyncError>
    where
        F: FnMut(Progress) + Send,
    {
        let total = units.len();
        if total == 0 {
            return Err(SyncError::InvalidRequest(
                "Nothing to populate".to_string(),
            ));
        }

        let concurrency = self.sync.config().snapshot().sync.bulk_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();
        tracing::info!(total, concurrency, "bulk population started");

        for unit in units {
            let sync = Arc::clone(&self.sync);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => load_unit(&sync, &unit).await,
                    Err(e) => Err(SyncError::InvalidRequest(e.to_string())),
                };
                let _ = tx.send((unit, outcome));
            });
        }
        drop(tx);

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let (mut completed, mut failed) = (0usize, 0usize);
        let mut last_error = None;

        while completed + failed < total {
            let Some((unit, outcome)) = rx.recv().await else {
                // A worker went away without reporting.
                failed = total - completed;
                break;
            };
            match outcome {
                Ok(batch) => {
                    completed += 1;
                    tracing::debug!(%unit, count = batch.len(), "bulk unit done");
                    for record in batch {
                        if seen.insert(record.id.clone()) {
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!("Bulk unit {} failed: {}", unit, e);
                    last_error = Some(e);
                }
            }
            progress(Progress {
                processed: completed + failed,
                total,
                items_so_far: records.len(),
            });
        }

        tracing::info!(completed, failed, items = records.len(), "bulk population finished");
        if completed == 0 {
            return Err(SyncError::Aggregate {
                failed,
                last: Box::new(last_error.unwrap_or_else(|| {
                    SyncError::EmptyResult("no bulk unit reported".to_string())
                })),
            });
        }
        Ok(BulkReport {
            records,
            completed,
            failed,
            total,
        })
    }
}

async fn load_unit(sync: &SyncOrchestrator, unit: &Unit) -> Result<Vec<CatalogRecord>, SyncError> {
    let config = sync.config().snapshot().sync;
    let page_size = config.bulk_page_size.clamp(1, MAX_PAGE_SIZE);
    let category_size = config.category_page_size.clamp(1, MAX_PAGE_SIZE);

    match unit {
        Unit::Page(page) => {
            let request = PageRequest::new(*page, page_size, CatalogFilter::none())
                .without_cache()
                .without_fallback();
            Ok(sync.load_page(&request).await?.records)
        }
        Unit::Category(CategoryKind::Genre, slug) => sync.load_by_genre(slug, category_size).await,
        Unit::Category(CategoryKind::Platform, slug) => {
            sync.load_by_platform(slug, category_size).await
        }
        Unit::Popular => sync.load_popular(MIXED_LIST_SIZE).await,
        Unit::Recent => sync.load_recent(MIXED_LIST_SIZE).await,
    }
}

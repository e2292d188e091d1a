use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use futures_util::future;

use crate::cache_gate::{CacheGate, GAMES_BUCKET};
use crate::catalog::{CatalogFilter, CatalogRecord};
use crate::config::{SharedConfig, MAX_PAGE_SIZE};
use crate::convert::RecordConverter;
use crate::error::SyncError;
use crate::remote::{validate_page_size, CatalogRemote, ListQuery, MetadataKind, RawPage};
use crate::store::CatalogStore;

const ORDER_BY_RATING: &str = "-rating";
const ORDER_BY_RELEASED: &str = "-released";

/// What a failed remote request may fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Serve whatever the local store holds when the remote fails.
    LocalStore,
    /// Surface the remote failure.
    Never,
}

/// One list-page request.
///
/// Cache gating and stale fallback are only ever enabled for page 1 of the
/// unfiltered list; both can be switched off but never on.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
    pub filter: CatalogFilter,
    use_cache: bool,
    fallback: FallbackPolicy,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32, filter: CatalogFilter) -> Self {
        let first_unfiltered = page == 1 && filter.is_empty();
        Self {
            page,
            page_size,
            filter,
            use_cache: first_unfiltered,
            fallback: if first_unfiltered {
                FallbackPolicy::LocalStore
            } else {
                FallbackPolicy::Never
            },
        }
    }

    pub fn first_page(page_size: u32) -> Self {
        Self::new(1, page_size, CatalogFilter::none())
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = FallbackPolicy::Never;
        self
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    /// Page 1 of the unfiltered list, the only shape tied to the games bucket.
    pub fn is_first_unfiltered(&self) -> bool {
        self.page == 1 && self.filter.is_empty()
    }

    fn query(&self) -> ListQuery {
        ListQuery::page(self.page, self.page_size).with_filter(self.filter.clone())
    }
}

/// Where a successful result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Fresh cache, served from the local store without a remote call
    Cache,
    Remote,
    /// The remote failed and local data was substituted
    StaleFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub records: Vec<CatalogRecord>,
    pub source: Source,
}

impl Fetched {
    fn new(records: Vec<CatalogRecord>, source: Source) -> Self {
        Self { records, source }
    }
}

/// Genre, platform and store names; each list loads independently.
#[derive(Debug)]
pub struct MetadataLists {
    pub genres: Result<Vec<String>, SyncError>,
    pub platforms: Result<Vec<String>, SyncError>,
    pub stores: Result<Vec<String>, SyncError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalReport {
    pub fetched: usize,
    pub new_records: usize,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub key_configured: bool,
    pub masked_key: String,
    pub base_url: String,
    pub store_backend: String,
    pub games_fresh: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    /// `None` when the store could not be read
    pub record_count: Option<usize>,
}

/// `"{year-1}-07-01,{year}-12-31"`, the release window of "recent" games.
pub fn recent_dates_window(year: i32) -> String {
    format!("{}-07-01,{}-12-31", year - 1, year)
}

/// Coordinates remote fetches, conversion, persistence and cache freshness.
pub struct SyncOrchestrator {
    remote: Arc<dyn CatalogRemote>,
    store: Arc<dyn CatalogStore>,
    gate: Arc<CacheGate>,
    config: SharedConfig,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn CatalogRemote>,
        store: Arc<dyn CatalogStore>,
        gate: Arc<CacheGate>,
        config: SharedConfig,
    ) -> Self {
        Self {
            remote,
            store,
            gate,
            config,
        }
    }

    pub fn remote(&self) -> Arc<dyn CatalogRemote> {
        Arc::clone(&self.remote)
    }

    pub fn store(&self) -> Arc<dyn CatalogStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Converter built from the current description cap.
    pub fn converter(&self) -> RecordConverter {
        RecordConverter::new(self.config.snapshot().sync.description_max_chars)
    }

    /// Default page size from configuration, clamped to the remote's limit.
    pub fn page_size(&self) -> u32 {
        self.config.snapshot().effective_page_size()
    }

    /// Load one page: fresh cache, then remote, then (if allowed) local data.
    pub async fn load_page(&self, request: &PageRequest) -> Result<Fetched, SyncError> {
        let query = request.query();
        query.validate()?;

        if request.uses_cache() && request.is_first_unfiltered() && self.gate.is_fresh(GAMES_BUCKET)
        {
            match self.store.get_all().await {
                Ok(records) if !records.is_empty() => {
                    tracing::debug!(count = records.len(), "serving page 1 from fresh cache");
                    return Ok(Fetched::new(records, Source::Cache));
                }
                Ok(_) => tracing::debug!("cache is fresh but the store is empty, fetching"),
                Err(e) => tracing::warn!("Could not read local catalog, fetching: {:#}", e),
            }
        }

        match self
            .fetch_and_store(&query, request.is_first_unfiltered())
            .await
        {
            Ok(records) => Ok(Fetched::new(records, Source::Remote)),
            Err(err) if request.fallback() == FallbackPolicy::LocalStore => {
                let local = self.store.get_all().await;
                settle_fallback(err, local, "page 1")
            }
            Err(err) => Err(err),
        }
    }

    /// Remote search, falling back to a name match over stored records.
    pub async fn search(&self, query: &str) -> Result<Fetched, SyncError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SyncError::InvalidRequest(
                "Search query must not be empty".to_string(),
            ));
        }

        let page_size = self.page_size();
        tracing::debug!(query, page_size, "catalog search");
        let remote = match self.remote.search_games(query, page_size).await {
            Ok(page) => self.convert_page(page, &format!("search \"{}\"", query)),
            Err(e) => Err(e),
        };

        match remote {
            Ok(records) => {
                self.persist(&records, false).await;
                Ok(Fetched::new(records, Source::Remote))
            }
            Err(err @ SyncError::InvalidRequest(_)) => Err(err),
            Err(err) => {
                let pattern = format!("%{}%", query);
                let local = self.store.find_by_name_like(&pattern).await;
                settle_fallback(err, local, "search")
            }
        }
    }

    /// Drop the games bucket and reload page 1. Failures are never masked.
    pub async fn force_refresh(&self) -> Result<Fetched, SyncError> {
        self.gate.clear(GAMES_BUCKET);
        let query = ListQuery::page(1, self.page_size());
        let records = self.fetch_and_store(&query, true).await?;
        tracing::info!(count = records.len(), "catalog refreshed");
        Ok(Fetched::new(records, Source::Remote))
    }

    /// Full record for `id`, from the remote or else from the local store.
    pub async fn get_detail(&self, id: &str) -> Result<(CatalogRecord, Source), SyncError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SyncError::InvalidRequest("Game id must not be empty".to_string()));
        }

        let fetched = match self.remote.get_game_detail(id).await {
            Ok(detail) => self.converter().convert_detail(&detail),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(record) => {
                self.persist(std::slice::from_ref(&record), false).await;
                Ok((record, Source::Remote))
            }
            Err(err @ SyncError::InvalidRequest(_)) => Err(err),
            Err(err) => match self.store.find_by_id(id).await {
                Ok(Some(record)) => {
                    tracing::info!("Detail for {} unavailable ({}), using stored record", id, err);
                    Ok((record, Source::StaleFallback))
                }
                Ok(None) => Err(err),
                Err(store_err) => Err(SyncError::LocalStore(format!(
                    "{:#} (after remote failure: {})",
                    store_err, err
                ))),
            },
        }
    }

    /// Highest-rated games.
    pub async fn load_popular(&self, count: u32) -> Result<Vec<CatalogRecord>, SyncError> {
        let query = ListQuery::page(1, count).ordered_by(ORDER_BY_RATING);
        self.fetch_and_store(&query, false).await
    }

    /// Latest releases, from July 1st of last year to the end of this year.
    pub async fn load_recent(&self, count: u32) -> Result<Vec<CatalogRecord>, SyncError> {
        let query = ListQuery::page(1, count)
            .ordered_by(ORDER_BY_RELEASED)
            .released_between(recent_dates_window(Utc::now().year()));
        self.fetch_and_store(&query, false).await
    }

    pub async fn load_by_genre(&self, slug: &str, count: u32) -> Result<Vec<CatalogRecord>, SyncError> {
        let slug = non_blank_slug(slug, "genre")?;
        let query = ListQuery::page(1, count)
            .with_filter(CatalogFilter::genre(slug))
            .ordered_by(ORDER_BY_RATING);
        self.fetch_and_store(&query, false).await
    }

    pub async fn load_by_platform(
        &self,
        slug: &str,
        count: u32,
    ) -> Result<Vec<CatalogRecord>, SyncError> {
        let slug = non_blank_slug(slug, "platform")?;
        let query = ListQuery::page(1, count)
            .with_filter(CatalogFilter::platform(slug))
            .ordered_by(ORDER_BY_RATING);
        self.fetch_and_store(&query, false).await
    }

    pub async fn load_metadata(&self) -> MetadataLists {
        let (genres, platforms, stores) = future::join3(
            self.remote.list_names(MetadataKind::Genres),
            self.remote.list_names(MetadataKind::Platforms),
            self.remote.list_names(MetadataKind::Stores),
        )
        .await;
        for (kind, result) in [
            (MetadataKind::Genres, &genres),
            (MetadataKind::Platforms, &platforms),
            (MetadataKind::Stores, &stores),
        ] {
            if let Err(e) = result {
                tracing::warn!("Could not load {}: {}", kind, e);
            }
        }
        MetadataLists {
            genres,
            platforms,
            stores,
        }
    }

    /// Pull the largest first page, bypassing the cache, and store it.
    pub async fn populate_incremental(&self) -> Result<IncrementalReport, SyncError> {
        let page = self
            .remote
            .list_games(&ListQuery::page(1, MAX_PAGE_SIZE))
            .await?;
        let records = self.convert_page(page, "incremental update")?;

        let mut new_records = 0;
        for record in &records {
            match self.store.find_by_id(&record.id).await {
                Ok(None) => new_records += 1,
                Ok(Some(_)) => {}
                Err(e) => {
                    return Err(SyncError::LocalStore(format!(
                        "Could not check stored record {}: {:#}",
                        record.id, e
                    )));
                }
            }
        }
        self.persist(&records, false).await;

        tracing::info!(fetched = records.len(), new_records, "incremental update done");
        Ok(IncrementalReport {
            fetched: records.len(),
            new_records,
        })
    }

    /// One-item request that only checks the key and connectivity.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        let api = self.config.snapshot().api;
        if !api.is_key_configured() {
            return Err(SyncError::InvalidRequest(
                "API key is not configured".to_string(),
            ));
        }
        tracing::debug!(key = %api.masked_key(), "testing catalog connection");
        self.remote.list_games(&ListQuery::page(1, 1)).await?;
        Ok(())
    }

    pub async fn status(&self) -> StatusReport {
        let api = self.config.snapshot().api;
        let record_count = match self.store.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!("Could not count stored records: {:#}", e);
                None
            }
        };
        StatusReport {
            key_configured: api.is_key_configured(),
            masked_key: api.masked_key(),
            base_url: api.base_url,
            store_backend: self.store.backend_name().to_string(),
            games_fresh: self.gate.is_fresh(GAMES_BUCKET),
            last_refresh: self.gate.last_refresh(GAMES_BUCKET),
            record_count,
        }
    }

    /// Forget every cache bucket and purge the local store.
    pub async fn clear_all(&self) -> Result<(), SyncError> {
        self.gate.clear_all();
        self.store.purge().await.map_err(SyncError::store)?;
        tracing::info!("local catalog cleared");
        Ok(())
    }

    /// Fetch a list page, convert it and upsert the survivors.
    ///
    /// Marks the games bucket only when `marks_games` is set and the
    /// upsert succeeded.
    async fn fetch_and_store(
        &self,
        query: &ListQuery,
        marks_games: bool,
    ) -> Result<Vec<CatalogRecord>, SyncError> {
        validate_page_size(query.page_size)?;
        tracing::debug!(page = query.page, filter = %query.filter, "fetching catalog page");
        let page = self.remote.list_games(query).await?;
        let records = self.convert_page(page, &format!("page {} ({})", query.page, query.filter))?;
        self.persist(&records, marks_games).await;
        Ok(records)
    }

    /// Convert a page; a page with nothing usable counts as an empty result.
    fn convert_page(&self, page: RawPage, what: &str) -> Result<Vec<CatalogRecord>, SyncError> {
        if page.results.is_empty() {
            return Err(SyncError::EmptyResult(what.to_string()));
        }
        let records = self.converter().convert_batch(&page.results);
        if records.is_empty() {
            return Err(SyncError::EmptyResult(format!(
                "{}: every item was malformed",
                what
            )));
        }
        Ok(records)
    }

    async fn persist(&self, records: &[CatalogRecord], marks_games: bool) {
        match self.store.upsert_all(records).await {
            Ok(()) => {
                if marks_games {
                    self.gate.mark_refreshed(GAMES_BUCKET);
                }
            }
            Err(e) => tracing::warn!("Could not store {} records: {:#}", records.len(), e),
        }
    }
}

fn non_blank_slug<'a>(slug: &'a str, what: &str) -> Result<&'a str, SyncError> {
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(SyncError::InvalidRequest(format!("Empty {} slug", what)));
    }
    Ok(slug)
}

/// Turn a remote failure plus a local read into the caller's result.
fn settle_fallback(
    err: SyncError,
    local: anyhow::Result<Vec<CatalogRecord>>,
    what: &str,
) -> Result<Fetched, SyncError> {
    if matches!(err, SyncError::InvalidRequest(_)) {
        return Err(err);
    }
    match local {
        Ok(records) if !records.is_empty() => {
            tracing::info!(
                "Remote {} failed ({}), serving {} stored records",
                what,
                err,
                records.len()
            );
            Ok(Fetched::new(records, Source::StaleFallback))
        }
        Ok(_) => Err(err),
        Err(store_err) => Err(SyncError::LocalStore(format!(
            "{:#} (after remote failure: {})",
            store_err, err
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UNKNOWN_DEVELOPER;
    use crate::error::NetworkKind;
    use crate::testing::{detail_json, game_json, games, record, Harness};
    use serde_json::json;

    fn offline() -> SyncError {
        SyncError::network(NetworkKind::Connect, "connection refused")
    }

    #[tokio::test]
    async fn test_page_one_fetch_persists_and_marks_fresh() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(games(1, 5)));

        let fetched = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.source, Source::Remote);
        assert_eq!(fetched.records.len(), 5);
        assert_eq!(h.store.count().await.unwrap(), 5);
        assert!(h.gate.is_fresh(GAMES_BUCKET));
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_remote() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(games(1, 3)));
        h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();

        let again = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(again.source, Source::Cache);
        assert_eq!(again.records.len(), 3);
        assert_eq!(h.remote.list_count(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_with_empty_store_fetches() {
        let h = Harness::new();
        h.gate.mark_refreshed(GAMES_BUCKET);
        h.remote.on_page(1, Ok(games(1, 2)));

        let fetched = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.source, Source::Remote);
        assert_eq!(h.remote.list_count(), 1);
    }

    #[tokio::test]
    async fn test_later_pages_do_not_mark_fresh() {
        let h = Harness::new();
        h.remote.on_page(2, Ok(games(21, 20)));

        let request = PageRequest::new(2, 20, CatalogFilter::none());
        h.sync.load_page(&request).await.unwrap();
        assert!(!h.gate.is_fresh(GAMES_BUCKET));

        h.remote.on_page(1, Ok(games(1, 20)));
        let filtered = PageRequest::new(1, 20, CatalogFilter::genre("rpg"));
        h.sync.load_page(&filtered).await.unwrap();
        assert!(!h.gate.is_fresh(GAMES_BUCKET));
    }

    #[tokio::test]
    async fn test_page_one_failure_falls_back_to_store() {
        let h = Harness::new();
        h.seed(&[record("1", "Stored A"), record("2", "Stored B")]).await;
        h.remote.on_page(1, Err(offline()));

        let fetched = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.source, Source::StaleFallback);
        assert_eq!(fetched.records.len(), 2);
        assert!(!h.gate.is_fresh(GAMES_BUCKET));
    }

    #[tokio::test]
    async fn test_page_one_failure_with_empty_store_surfaces_error() {
        let h = Harness::new();
        h.remote.on_page(1, Err(SyncError::protocol(401)));

        let err = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap_err();
        assert_eq!(err.category(), "auth");
    }

    #[tokio::test]
    async fn test_paged_and_filtered_failures_never_fall_back() {
        let h = Harness::new();
        h.seed(&[record("1", "Stored")]).await;
        h.remote.on_page(1, Err(offline()));
        h.remote.on_page(3, Err(offline()));

        let paged = PageRequest::new(3, 20, CatalogFilter::none());
        assert_eq!(paged.fallback(), FallbackPolicy::Never);
        assert!(h.sync.load_page(&paged).await.is_err());

        let filtered = PageRequest::new(1, 20, CatalogFilter::platform("pc"));
        let err = h.sync.load_page(&filtered).await.unwrap_err();
        assert_eq!(err.category(), "network");
    }

    #[tokio::test]
    async fn test_empty_success_is_an_error_and_falls_back() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(vec![]));
        h.remote.on_page(2, Ok(vec![]));

        let err = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap_err();
        assert_eq!(err.category(), "empty");

        let err = h
            .sync
            .load_page(&PageRequest::new(2, 20, CatalogFilter::none()))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "empty");

        h.seed(&[record("9", "Stored")]).await;
        let fetched = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.source, Source::StaleFallback);
    }

    #[tokio::test]
    async fn test_fallback_can_be_disabled() {
        let h = Harness::new();
        h.seed(&[record("1", "Stored")]).await;
        h.remote.on_page(1, Err(offline()));

        let request = PageRequest::first_page(20).without_fallback();
        assert!(h.sync.load_page(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_page_size_is_rejected_without_fallback() {
        let h = Harness::new();
        h.seed(&[record("1", "Stored")]).await;

        let err = h
            .sync
            .load_page(&PageRequest::first_page(41))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "invalid_request");
        assert_eq!(h.remote.list_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_items_are_skipped() {
        let h = Harness::new();
        h.remote.on_page(
            1,
            Ok(vec![game_json(1, "Good"), json!({"name": "no id"}), game_json(3, "Fine")]),
        );

        let fetched = h.sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.records.len(), 2);
    }

    #[tokio::test]
    async fn test_search_remote_then_local() {
        let h = Harness::new();
        h.remote.on_search(Ok(vec![game_json(5, "Portal 2")]));
        let fetched = h.sync.search("portal").await.unwrap();
        assert_eq!(fetched.source, Source::Remote);
        assert!(h.store.find_by_id("5").await.unwrap().is_some());

        h.seed(&[record("6", "Portal"), record("7", "Braid")]).await;
        h.remote.on_search(Err(offline()));
        let fetched = h.sync.search("PORTAL").await.unwrap();
        assert_eq!(fetched.source, Source::StaleFallback);
        assert_eq!(fetched.records.len(), 2);
    }

    #[tokio::test]
    async fn test_offline_search_matches_anywhere_in_name() {
        let h = Harness::new();
        h.seed(&[
            record("1", "Dark Souls"),
            record("2", "Save 50% Off Simulator"),
            record("3", "Braid"),
        ])
        .await;
        h.remote.on_search(Err(offline()));

        let fetched = h.sync.search("s_ul").await.unwrap();
        assert_eq!(fetched.source, Source::StaleFallback);
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.records[0].name, "Dark Souls");

        let fetched = h.sync.search("50%").await.unwrap();
        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.records[0].id, "2");
    }

    #[tokio::test]
    async fn test_search_without_local_match_surfaces_remote_error() {
        let h = Harness::new();
        h.seed(&[record("7", "Braid")]).await;
        h.remote.on_search(Err(SyncError::protocol(429)));

        let err = h.sync.search("zelda").await.unwrap_err();
        assert_eq!(err.category(), "rate_limit");
        assert_eq!(h.remote.search_count(), 1);

        let err = h.sync.search("   ").await.unwrap_err();
        assert_eq!(err.category(), "invalid_request");
        assert_eq!(h.remote.search_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_propagates_failure() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(games(1, 3)));
        h.sync.force_refresh().await.unwrap();
        assert!(h.gate.is_fresh(GAMES_BUCKET));

        h.remote.on_page(1, Err(SyncError::protocol(503)));
        let err = h.sync.force_refresh().await.unwrap_err();
        assert_eq!(err.category(), "server");
        assert!(!h.gate.is_fresh(GAMES_BUCKET));
    }

    #[tokio::test]
    async fn test_get_detail_and_offline_fallback() {
        let h = Harness::new();
        h.remote.on_detail("10", Ok(detail_json(10, "Hollow Knight", "Team Cherry")));

        let (record_, source) = h.sync.get_detail("10").await.unwrap();
        assert_eq!(source, Source::Remote);
        assert_eq!(record_.studio, "Team Cherry");

        h.remote.on_detail("10", Err(offline()));
        let (stored, source) = h.sync.get_detail("10").await.unwrap();
        assert_eq!(source, Source::StaleFallback);
        assert_eq!(stored.studio, "Team Cherry");

        let err = h.sync.get_detail("11").await.unwrap_err();
        assert_eq!(err.category(), "protocol");
    }

    #[tokio::test]
    async fn test_curated_loads_send_ordering() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(games(1, 2)));

        h.sync.load_popular(20).await.unwrap();
        h.sync.load_recent(20).await.unwrap();
        h.sync.load_by_genre("rpg", 15).await.unwrap();
        h.sync.load_by_platform("pc", 15).await.unwrap();
        assert!(h.sync.load_by_genre(" ", 15).await.is_err());

        let queries = h.remote.list_queries();
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0].ordering.as_deref(), Some("-rating"));
        assert_eq!(queries[1].ordering.as_deref(), Some("-released"));
        assert!(queries[1].dates.is_some());
        assert_eq!(queries[2].filter, CatalogFilter::genre("rpg"));
        assert_eq!(queries[3].filter, CatalogFilter::platform("pc"));
        assert!(!h.gate.is_fresh(GAMES_BUCKET));
    }

    #[test]
    fn test_recent_dates_window() {
        assert_eq!(recent_dates_window(2026), "2025-07-01,2026-12-31");
    }

    #[tokio::test]
    async fn test_metadata_lists_load_independently() {
        let h = Harness::new();
        h.remote
            .on_names(MetadataKind::Genres, Ok(vec!["Action".into(), "RPG".into()]));
        h.remote.on_names(MetadataKind::Platforms, Err(offline()));

        let lists = h.sync.load_metadata().await;
        assert_eq!(lists.genres.unwrap().len(), 2);
        assert!(lists.platforms.is_err());
        assert!(lists.stores.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_incremental_counts_new_records() {
        let h = Harness::new();
        h.seed(&[record("1", "Game 1")]).await;
        h.remote.on_page(1, Ok(games(1, 4)));

        let report = h.sync.populate_incremental().await.unwrap();
        assert_eq!(report, IncrementalReport { fetched: 4, new_records: 3 });
        assert_eq!(h.remote.list_queries()[0].page_size, MAX_PAGE_SIZE);
        assert_eq!(h.store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_connection_requires_key() {
        let h = Harness::new();
        let err = h.sync.test_connection().await.unwrap_err();
        assert_eq!(err.category(), "invalid_request");

        h.config.update(|c| c.api.api_key = "0123456789abcdef".into());
        h.remote.on_page(1, Ok(games(1, 1)));
        h.sync.test_connection().await.unwrap();
        assert_eq!(h.remote.list_queries()[0].page_size, 1);
    }

    #[tokio::test]
    async fn test_status_and_clear_all() {
        let h = Harness::new();
        h.remote.on_page(1, Ok(games(1, 3)));
        h.sync.force_refresh().await.unwrap();

        let status = h.sync.status().await;
        assert!(!status.key_configured);
        assert_eq!(status.store_backend, "memory");
        assert!(status.games_fresh);
        assert_eq!(status.record_count, Some(3));

        h.sync.clear_all().await.unwrap();
        let status = h.sync.status().await;
        assert!(!status.games_fresh);
        assert_eq!(status.record_count, Some(0));
    }

    #[tokio::test]
    async fn test_detail_conversion_failure_uses_stored_record() {
        let h = Harness::new();
        let mut stored = record("12", "Stored Game");
        stored.studio = UNKNOWN_DEVELOPER.into();
        h.seed(&[stored]).await;
        h.remote.on_detail("12", Ok(json!({"name": "missing id"})));

        let (found, source) = h.sync.get_detail("12").await.unwrap();
        assert_eq!(source, Source::StaleFallback);
        assert_eq!(found.name, "Stored Game");
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl CatalogStore for BrokenStore {
        fn backend_name(&self) -> &str {
            "broken"
        }
        async fn upsert_all(&self, _: &[CatalogRecord]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn get_all(&self) -> anyhow::Result<Vec<CatalogRecord>> {
            anyhow::bail!("disk unreadable")
        }
        async fn find_by_id(&self, _: &str) -> anyhow::Result<Option<CatalogRecord>> {
            anyhow::bail!("disk unreadable")
        }
        async fn purge(&self) -> anyhow::Result<()> {
            anyhow::bail!("disk unreadable")
        }
    }

    fn broken_store_sync(h: &Harness) -> SyncOrchestrator {
        SyncOrchestrator::new(
            h.remote.clone(),
            Arc::new(BrokenStore),
            h.gate.clone(),
            h.config.clone(),
        )
    }

    #[tokio::test]
    async fn test_store_failure_during_fallback_is_escalated() {
        let h = Harness::new();
        let sync = broken_store_sync(&h);
        h.remote.on_page(1, Err(offline()));
        let err = sync.load_page(&PageRequest::first_page(20)).await.unwrap_err();
        assert_eq!(err.category(), "local_store");

        // A failed upsert does not fail the read, but leaves the bucket stale.
        h.remote.on_page(1, Ok(games(1, 2)));
        let fetched = sync.load_page(&PageRequest::first_page(20)).await.unwrap();
        assert_eq!(fetched.records.len(), 2);
        assert!(!h.gate.is_fresh(GAMES_BUCKET));

        let status = sync.status().await;
        assert_eq!(status.record_count, None);
    }

    #[tokio::test]
    async fn test_incremental_fails_when_store_cannot_be_checked() {
        let h = Harness::new();
        let sync = broken_store_sync(&h);
        h.remote.on_page(1, Ok(games(1, 4)));

        let err = sync.populate_incremental().await.unwrap_err();
        assert_eq!(err.category(), "local_store");
    }
}

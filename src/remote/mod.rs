//! Remote catalog access.
//!
//! [`CatalogRemote`] is the seam between the engine and the network. It
//! returns remote-schema payloads untouched: list items and detail bodies
//! stay as JSON values so a single malformed entry can be rejected by the
//! converter without losing the rest of the page.

pub mod rawg;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::CatalogFilter;
use crate::config::MAX_PAGE_SIZE;
use crate::error::SyncError;

pub use rawg::RawgClient;

/// One list item as the remote sent it.
pub type RawListItem = Value;

/// One detail body as the remote sent it.
pub type RawDetail = Value;

/// A page of list results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<RawListItem>,
}

/// Parameters of a `games` list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub filter: CatalogFilter,
    /// Ordering directive, e.g. `-rating` or `-released`
    pub ordering: Option<String>,
    /// Release-date window, `YYYY-MM-DD,YYYY-MM-DD`
    pub dates: Option<String>,
}

impl ListQuery {
    pub fn page(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            filter: CatalogFilter::none(),
            ordering: None,
            dates: None,
        }
    }

    pub fn with_filter(mut self, filter: CatalogFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn ordered_by(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn released_between(mut self, dates: impl Into<String>) -> Self {
        self.dates = Some(dates.into());
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page == 0 {
            return Err(SyncError::InvalidRequest(format!(
                "Invalid page number: {}",
                self.page
            )));
        }
        validate_page_size(self.page_size)
    }

    /// Query-string pairs, excluding the API key.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(genre) = non_blank(&self.filter.genre) {
            params.push(("genres", genre.to_string()));
        }
        if let Some(platform) = non_blank(&self.filter.platform) {
            params.push(("platforms", platform.to_string()));
        }
        if let Some(ordering) = non_blank(&self.ordering) {
            params.push(("ordering", ordering.to_string()));
        }
        if let Some(dates) = non_blank(&self.dates) {
            params.push(("dates", dates.to_string()));
        }
        params
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn validate_page_size(page_size: u32) -> Result<(), SyncError> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(SyncError::InvalidRequest(format!(
            "Page size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, page_size
        )));
    }
    Ok(())
}

/// Named lookup lists the remote exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Genres,
    Platforms,
    Stores,
}

impl MetadataKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            MetadataKind::Genres => "genres",
            MetadataKind::Platforms => "platforms",
            MetadataKind::Stores => "stores",
        }
    }
}

impl std::fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// The remote catalog service.
///
/// Implementations perform no retries; retry and fallback policy belongs
/// to the sync layer.
#[async_trait]
pub trait CatalogRemote: Send + Sync {
    /// Fetch one page of the game list
    async fn list_games(&self, query: &ListQuery) -> Result<RawPage, SyncError>;

    /// Free-text search
    async fn search_games(&self, query: &str, page_size: u32) -> Result<RawPage, SyncError>;

    /// Full detail body of one game
    async fn get_game_detail(&self, id: &str) -> Result<RawDetail, SyncError>;

    /// Names of every genre, platform or store
    async fn list_names(&self, kind: MetadataKind) -> Result<Vec<String>, SyncError>;
}

//! The synchronization engine.
//!
//! [`SyncOrchestrator`] owns the fetch/fallback protocol for single
//! requests. [`BulkPopulator`] and [`EnrichmentPipeline`] build on it for
//! multi-unit population and detail enrichment.

pub mod bulk;
pub mod enrich;
pub mod orchestrator;

pub use bulk::{BulkPopulator, BulkReport, CategoryKind, Progress, DEFAULT_GENRES};
pub use enrich::{needs_enrichment, EnrichmentPipeline, EnrichmentReport};
pub use orchestrator::{
    recent_dates_window, FallbackPolicy, Fetched, IncrementalReport, MetadataLists, PageRequest,
    Source, StatusReport, SyncOrchestrator,
};

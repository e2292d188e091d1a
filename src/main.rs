//! gamevault: command-line front end for the catalog sync engine.
//!
//! Usage: gamevault <command> [args]

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use gamevault::cache_gate::CacheGate;
use gamevault::config::{Config, SharedConfig};
use gamevault::remote::RawgClient;
use gamevault::store::{CatalogStore, MemoryStore, RedbStore};
use gamevault::sync::{
    BulkPopulator, CategoryKind, EnrichmentPipeline, Fetched, PageRequest, Progress, Source,
    SyncOrchestrator, DEFAULT_GENRES,
};
use gamevault::{CatalogFilter, CatalogRecord, SyncError};

const USAGE: &str = "Usage: gamevault <command> [args]

Commands:
  page [n] [--genre slug] [--platform slug]   load one page
  search <query>                              search remote, then local
  refresh                                     force-refresh page 1
  bulk <pages>                                populate pages 1..=n
  genres [slug...]                            populate by genre
  platforms <slug...>                         populate by platform
  mixed                                       popular + recent + random page
  incremental                                 pull the newest 40 games
  detail <id>                                 full record for one game
  metadata                                    genre, platform and store names
  status                                      configuration and cache state
  test                                        check API key and connectivity
  clear                                       purge local data and cache state
  config                                      print an example config";

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("gamevault=info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };
    if command == "config" {
        println!("{}", Config::example_config());
        return Ok(());
    }

    let config = SharedConfig::from_file(&Config::config_path()?)?;
    let sync = Arc::new(build_orchestrator(&config)?);
    let rest = &args[1..];

    let result = match command {
        "page" => cmd_page(&sync, rest).await,
        "search" => cmd_search(&sync, rest).await,
        "refresh" => enrich_and_print(&sync, sync.force_refresh().await).await,
        "bulk" => cmd_bulk(&sync, rest).await,
        "genres" => cmd_categories(&sync, CategoryKind::Genre, rest).await,
        "platforms" => cmd_categories(&sync, CategoryKind::Platform, rest).await,
        "mixed" => report_bulk(BulkPopulator::new(Arc::clone(&sync)).populate_mixed(print_progress).await),
        "incremental" => sync.populate_incremental().await.map(|report| {
            println!("fetched {}, new {}", report.fetched, report.new_records);
        }),
        "detail" => cmd_detail(&sync, rest).await,
        "metadata" => {
            cmd_metadata(&sync).await;
            Ok(())
        }
        "status" => {
            cmd_status(&sync).await;
            Ok(())
        }
        "test" => sync.test_connection().await.map(|()| println!("Connection OK")),
        "clear" => sync.clear_all().await.map(|()| println!("Local catalog cleared")),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error [{}]: {}", e.category(), e.user_message());
        tracing::debug!("{:?}", e);
        std::process::exit(2);
    }
    Ok(())
}

fn build_orchestrator(config: &SharedConfig) -> Result<SyncOrchestrator> {
    let snapshot = config.snapshot();
    if !snapshot.api.is_key_configured() {
        tracing::warn!("API key is not configured; set api.api_key or RAWG_API_KEY");
    }
    let remote = Arc::new(RawgClient::new(&snapshot.api).context("Failed to build HTTP client")?);

    let db_path = snapshot.storage.resolve_db_path()?;
    let store: Arc<dyn CatalogStore> = match RedbStore::open(&db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Could not open catalog database, using memory store: {:#}", e);
            Arc::new(MemoryStore::new())
        }
    };

    let gate = CacheGate::new(config.clone()).with_persistence(db_path.with_extension("cache.json"));
    Ok(SyncOrchestrator::new(remote, store, Arc::new(gate), config.clone()))
}

async fn cmd_page(sync: &SyncOrchestrator, args: &[String]) -> Result<(), SyncError> {
    let mut page = 1;
    let mut filter = CatalogFilter::none();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--genre" => filter.genre = iter.next().cloned(),
            "--platform" => filter.platform = iter.next().cloned(),
            other => {
                page = other
                    .parse()
                    .map_err(|_| SyncError::InvalidRequest(format!("Invalid page: {}", other)))?;
            }
        }
    }
    let request = PageRequest::new(page, sync.page_size(), filter);
    enrich_and_print(sync, sync.load_page(&request).await).await
}

async fn cmd_search(sync: &SyncOrchestrator, args: &[String]) -> Result<(), SyncError> {
    enrich_and_print(sync, sync.search(&args.join(" ")).await).await
}

async fn cmd_bulk(sync: &Arc<SyncOrchestrator>, args: &[String]) -> Result<(), SyncError> {
    let pages = match args.first() {
        Some(n) => n
            .parse()
            .map_err(|_| SyncError::InvalidRequest(format!("Invalid page count: {}", n)))?,
        None => 5,
    };
    report_bulk(
        BulkPopulator::new(Arc::clone(sync))
            .populate_pages(pages, print_progress)
            .await,
    )
}

async fn cmd_categories(
    sync: &Arc<SyncOrchestrator>,
    kind: CategoryKind,
    args: &[String],
) -> Result<(), SyncError> {
    let slugs: Vec<String> = if args.is_empty() && kind == CategoryKind::Genre {
        DEFAULT_GENRES.iter().map(|s| s.to_string()).collect()
    } else {
        args.to_vec()
    };
    report_bulk(
        BulkPopulator::new(Arc::clone(sync))
            .populate_categories(kind, &slugs, print_progress)
            .await,
    )
}

async fn cmd_detail(sync: &SyncOrchestrator, args: &[String]) -> Result<(), SyncError> {
    let id = args.first().map(String::as_str).unwrap_or("");
    let (record, source) = sync.get_detail(id).await?;
    if source == Source::StaleFallback {
        println!("(offline, showing stored record)");
    }
    println!("{} [{}]", record.name, record.id);
    println!("Studio:    {}", record.studio);
    println!("Rating:    {:.2}", record.rating);
    println!("Platforms: {}", record.platforms.join(", "));
    println!("Genres:    {}", record.genres.join(", "));
    println!("Stores:    {}", record.stores.join(", "));
    println!();
    println!("{}", record.description);
    Ok(())
}

async fn cmd_metadata(sync: &SyncOrchestrator) {
    let lists = sync.load_metadata().await;
    for (label, list) in [
        ("Genres", lists.genres),
        ("Platforms", lists.platforms),
        ("Stores", lists.stores),
    ] {
        match list {
            Ok(names) => println!("{}: {}", label, names.join(", ")),
            Err(e) => println!("{}: unavailable ({})", label, e.user_message()),
        }
    }
}

async fn cmd_status(sync: &SyncOrchestrator) {
    let status = sync.status().await;
    println!("API key:     {}", status.masked_key);
    println!("Configured:  {}", status.key_configured);
    println!("Base URL:    {}", status.base_url);
    println!("Store:       {}", status.store_backend);
    match status.record_count {
        Some(count) => println!("Records:     {}", count),
        None => println!("Records:     unavailable"),
    }
    let refreshed = status
        .last_refresh
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "Games cache: {} (last refresh {})",
        if status.games_fresh { "fresh" } else { "stale" },
        refreshed
    );
}

async fn enrich_and_print(
    sync: &SyncOrchestrator,
    result: Result<Fetched, SyncError>,
) -> Result<(), SyncError> {
    let fetched = result?;
    let records = match fetched.source {
        Source::Remote => {
            let enriched = EnrichmentPipeline::for_orchestrator(sync)
                .enrich(&fetched.records)
                .await;
            match enriched {
                Ok(report) => report.records,
                Err(e) => {
                    tracing::warn!("Enrichment failed: {}", e);
                    fetched.records
                }
            }
        }
        Source::Cache => {
            println!("(from cache)");
            fetched.records
        }
        Source::StaleFallback => {
            println!("(offline, showing stored records)");
            fetched.records
        }
    };
    print_records(&records);
    Ok(())
}

fn report_bulk(result: Result<gamevault::sync::BulkReport, SyncError>) -> Result<(), SyncError> {
    let report = result?;
    println!(
        "{} of {} units succeeded, {} games",
        report.completed,
        report.total,
        report.records.len()
    );
    Ok(())
}

fn print_progress(progress: Progress) {
    eprintln!(
        "[{}/{}] {} games so far",
        progress.processed, progress.total, progress.items_so_far
    );
}

fn print_records(records: &[CatalogRecord]) {
    for record in records {
        println!(
            "{:>8}  {:<48}  {:<28}  {:.2}",
            record.id, record.name, record.studio, record.rating
        );
    }
}

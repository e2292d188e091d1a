use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};

use super::orchestrator::SyncOrchestrator;
use crate::catalog::CatalogRecord;
use crate::convert::{is_generic_studio, merge_detail, RecordConverter};
use crate::error::SyncError;
use crate::remote::CatalogRemote;
use crate::store::CatalogStore;

/// Whether a record's studio is too vague to show without a detail lookup.
pub fn needs_enrichment(record: &CatalogRecord) -> bool {
    record.has_unknown_studio() || is_generic_studio(&record.studio)
}

#[derive(Debug, Clone)]
pub struct EnrichmentReport {
    /// The input batch, with every successful lookup merged in at its index
    pub records: Vec<CatalogRecord>,
    pub attempted: usize,
    pub enriched: usize,
    pub failed: usize,
}

/// Fills in low-information records with bounded concurrent detail lookups.
///
/// At most `concurrency` lookups are in flight at any moment. Enriched
/// records are written back to the store in the background; a failed write
/// is logged and never reaches the caller.
pub struct EnrichmentPipeline {
    remote: Arc<dyn CatalogRemote>,
    store: Arc<dyn CatalogStore>,
    converter: RecordConverter,
    concurrency: usize,
}

impl EnrichmentPipeline {
    pub fn new(
        remote: Arc<dyn CatalogRemote>,
        store: Arc<dyn CatalogStore>,
        converter: RecordConverter,
        concurrency: usize,
    ) -> Self {
        Self {
            remote,
            store,
            converter,
            concurrency: concurrency.max(1),
        }
    }

    /// Pipeline sharing the orchestrator's remote, store and settings.
    pub fn for_orchestrator(sync: &SyncOrchestrator) -> Self {
        let concurrency = sync.config().snapshot().sync.enrichment_concurrency;
        Self::new(sync.remote(), sync.store(), sync.converter(), concurrency)
    }

    /// Enrich every record that needs it and return the merged batch.
    ///
    /// Fails with [`SyncError::Aggregate`] only when lookups were attempted
    /// and every one of them failed.
    pub async fn enrich(&self, batch: &[CatalogRecord]) -> Result<EnrichmentReport, SyncError> {
        let targets: Vec<usize> = batch
            .iter()
            .enumerate()
            .filter(|(_, record)| needs_enrichment(record))
            .map(|(index, _)| index)
            .collect();

        let attempted = targets.len();
        let mut merged = batch.to_vec();
        if attempted == 0 {
            return Ok(EnrichmentReport {
                records: merged,
                attempted,
                enriched: 0,
                failed: 0,
            });
        }

        tracing::debug!(attempted, concurrency = self.concurrency, "enriching records");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for index in targets {
            let remote = Arc::clone(&self.remote);
            let semaphore = Arc::clone(&semaphore);
            let converter = self.converter;
            let id = batch[index].id.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => match remote.get_game_detail(&id).await {
                        Ok(detail) => converter.convert_detail(&detail),
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(SyncError::InvalidRequest(e.to_string())),
                };
                let _ = tx.send((index, outcome));
            });
        }
        drop(tx);

        let mut enriched = Vec::new();
        let mut failed = 0usize;
        let mut last_error = None;

        while enriched.len() + failed < attempted {
            let Some((index, outcome)) = rx.recv().await else {
                failed = attempted - enriched.len();
                break;
            };
            match outcome {
                Ok(detail) => {
                    let record = merge_detail(&batch[index], detail);
                    merged[index] = record.clone();
                    enriched.push(record);
                }
                Err(e) => {
                    tracing::debug!("Could not enrich {}: {}", batch[index].id, e);
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        let enriched_count = enriched.len();
        tracing::debug!(enriched = enriched_count, failed, "enrichment finished");

        if enriched_count == 0 {
            return Err(SyncError::Aggregate {
                failed,
                last: Box::new(last_error.unwrap_or_else(|| {
                    SyncError::EmptyResult("no enrichment lookup reported".to_string())
                })),
            });
        }

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.upsert_all(&enriched).await {
                tracing::warn!("Could not store enriched records: {:#}", e);
            }
        });

        Ok(EnrichmentReport {
            records: merged,
            attempted,
            enriched: enriched_count,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UNKNOWN_DEVELOPER;
    use crate::error::NetworkKind;
    use crate::testing::{detail_json, record, FakeRemote};
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn pipeline(remote: Arc<FakeRemote>, store: Arc<MemoryStore>, cap: usize) -> EnrichmentPipeline {
        EnrichmentPipeline::new(remote, store, RecordConverter::default(), cap)
    }

    fn known(id: &str) -> CatalogRecord {
        let mut r = record(id, &format!("Game {}", id));
        r.studio = "Known Studio".into();
        r
    }

    async fn wait_for_count(store: &MemoryStore, expected: usize) {
        for _ in 0..100 {
            if store.count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store never reached {} records", expected);
    }

    #[test]
    fn test_needs_enrichment() {
        assert!(needs_enrichment(&record("1", "A")));
        let mut r = known("2");
        assert!(!needs_enrichment(&r));
        r.studio = "N/A".into();
        assert!(needs_enrichment(&r));
    }

    #[tokio::test]
    async fn test_only_successful_lookups_replace_records() {
        let remote = FakeRemote::new();
        let store = Arc::new(MemoryStore::new());

        let batch = vec![
            known("1"),
            record("2", "Unknown A"),
            known("3"),
            record("4", "Unknown B"),
            known("5"),
            record("6", "Unknown C"),
            known("7"),
        ];
        remote.on_detail("2", Ok(detail_json(2, "Detailed A", "Studio A")));
        remote.on_detail(
            "4",
            Err(SyncError::network(NetworkKind::Timeout, "slow")),
        );
        remote.on_detail("6", Ok(detail_json(6, "Detailed C", "Studio C")));

        let report = pipeline(remote.clone(), store.clone(), 5)
            .enrich(&batch)
            .await
            .unwrap();

        assert_eq!((report.attempted, report.enriched, report.failed), (3, 2, 1));
        assert_eq!(report.records.len(), 7);
        assert_eq!(report.records[1].studio, "Studio A");
        assert_eq!(report.records[3], batch[3]);
        assert_eq!(report.records[3].studio, UNKNOWN_DEVELOPER);
        assert_eq!(report.records[5].studio, "Studio C");
        for i in [0, 2, 4, 6] {
            assert_eq!(report.records[i], batch[i]);
        }
        assert_eq!(remote.detail_count(), 3);

        wait_for_count(&store, 2).await;
        assert!(store.find_by_id("2").await.unwrap().is_some());
        assert!(store.find_by_id("4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_batch_makes_no_lookups() {
        let remote = FakeRemote::new();
        let batch = vec![known("1"), known("2")];

        let report = pipeline(remote.clone(), Arc::new(MemoryStore::new()), 5)
            .enrich(&batch)
            .await
            .unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.records, batch);
        assert_eq!(remote.detail_count(), 0);
    }

    #[tokio::test]
    async fn test_every_lookup_failing_is_aggregate_error() {
        let remote = FakeRemote::new();
        let batch = vec![record("1", "A"), record("2", "B")];

        let err = pipeline(remote, Arc::new(MemoryStore::new()), 5)
            .enrich(&batch)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Aggregate { failed: 2, .. }));
    }

    #[tokio::test]
    async fn test_in_flight_lookups_never_exceed_cap() {
        let remote = FakeRemote::new();
        remote.delay_details(Duration::from_millis(20));
        let batch: Vec<CatalogRecord> = (1..=8)
            .map(|i| {
                remote.on_detail(&i.to_string(), Ok(detail_json(i, "Game", "Studio")));
                record(&i.to_string(), "Game")
            })
            .collect();

        let report = pipeline(remote.clone(), Arc::new(MemoryStore::new()), 2)
            .enrich(&batch)
            .await
            .unwrap();

        assert_eq!(report.enriched, 8);
        let peak = remote.max_in_flight.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak in-flight was {}", peak);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_enrichment() {
        struct ReadOnlyStore;

        #[async_trait::async_trait]
        impl CatalogStore for ReadOnlyStore {
            fn backend_name(&self) -> &str {
                "read-only"
            }
            async fn upsert_all(&self, _: &[CatalogRecord]) -> anyhow::Result<()> {
                anyhow::bail!("read-only")
            }
            async fn get_all(&self) -> anyhow::Result<Vec<CatalogRecord>> {
                Ok(Vec::new())
            }
            async fn find_by_id(&self, _: &str) -> anyhow::Result<Option<CatalogRecord>> {
                Ok(None)
            }
            async fn purge(&self) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let remote = FakeRemote::new();
        remote.on_detail("1", Ok(detail_json(1, "Game", "Studio")));
        let pipeline =
            EnrichmentPipeline::new(remote, Arc::new(ReadOnlyStore), RecordConverter::default(), 5);

        let report = pipeline.enrich(&[record("1", "Game")]).await.unwrap();
        assert_eq!(report.records[0].studio, "Studio");
    }
}

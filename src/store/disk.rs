use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::CatalogStore;
use crate::catalog::CatalogRecord;

const CATALOG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("catalog");

/// Catalog store backed by a redb file.
///
/// Records are stored as JSON bytes. redb calls block, so every operation
/// runs on the blocking pool rather than on the caller's task.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let db = Database::create(path).context("Failed to open catalog database")?;
        // Ensure table exists
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(CATALOG_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .context("Catalog database worker panicked")?
    }
}

fn decode(bytes: &[u8]) -> Option<CatalogRecord> {
    match serde_json::from_slice(bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!("Skipping unreadable catalog row: {}", e);
            None
        }
    }
}

#[async_trait]
impl CatalogStore for RedbStore {
    fn backend_name(&self) -> &str {
        "redb"
    }

    async fn upsert_all(&self, records: &[CatalogRecord]) -> Result<()> {
        let encoded = records
            .iter()
            .map(|r| -> Result<(String, Vec<u8>)> { Ok((r.id.clone(), serde_json::to_vec(r)?)) })
            .collect::<Result<Vec<_>>>()?;

        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(CATALOG_TABLE)?;
                for (id, json) in &encoded {
                    table.insert(id.as_str(), json.as_slice())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<CatalogRecord>> {
        self.blocking(|db| {
            let rtxn = db.begin_read()?;
            let table = rtxn.open_table(CATALOG_TABLE)?;
            let mut records = Vec::new();
            for item in table.iter()? {
                let (_, val) = item?;
                if let Some(record) = decode(val.value()) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let id = id.to_string();
        self.blocking(move |db| {
            let rtxn = db.begin_read()?;
            let table = rtxn.open_table(CATALOG_TABLE)?;
            let found = table.get(id.as_str())?;
            Ok(found.and_then(|val| decode(val.value())))
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking(|db| {
            let rtxn = db.begin_read()?;
            let table = rtxn.open_table(CATALOG_TABLE)?;
            Ok(table.len()? as usize)
        })
        .await
    }

    async fn purge(&self) -> Result<()> {
        self.blocking(|db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(CATALOG_TABLE)?;
                // Collect all keys then delete
                let keys: Vec<String> = table
                    .iter()?
                    .map(|r| r.map(|(k, _)| k.value().to_string()))
                    .collect::<std::result::Result<_, _>>()?;
                for key in keys {
                    table.remove(key.as_str())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }
}

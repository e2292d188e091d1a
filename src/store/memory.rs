use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::CatalogStore;
use crate::catalog::CatalogRecord;

/// Catalog store kept entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, CatalogRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert_all(&self, records: &[CatalogRecord]) -> Result<()> {
        let mut map = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        for record in records {
            map.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<CatalogRecord>> {
        let map = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        Ok(map.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CatalogRecord>> {
        let map = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        Ok(map.get(id).cloned())
    }

    async fn count(&self) -> Result<usize> {
        let map = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        Ok(map.len())
    }

    async fn purge(&self) -> Result<()> {
        let mut map = self
            .records
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        map.clear();
        Ok(())
    }
}

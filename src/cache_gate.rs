use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::SharedConfig;

/// Bucket for the unfiltered game list.
pub const GAMES_BUCKET: &str = "games";

/// Larger TTLs are treated as this (about a century).
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedStamps {
    #[serde(default)]
    buckets: HashMap<String, i64>,
}

/// Per-bucket refresh timestamps checked against the configured TTL.
///
/// The TTL is read from [`SharedConfig`] on every check, so a config change
/// applies to the next check.
pub struct CacheGate {
    stamps: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    write_lock: Arc<Mutex<()>>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    persist_path: Option<PathBuf>,
}

impl CacheGate {
    pub fn new(config: SharedConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            stamps: Arc::new(Mutex::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
            config,
            clock,
            persist_path: None,
        }
    }

    /// Keep timestamps in a JSON file at `path`, loading any already there.
    ///
    /// Persistence is best-effort: unreadable or unwritable files are logged
    /// and otherwise ignored.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match load_stamps(&path) {
            Ok(loaded) => *lock(&*self.stamps) = loaded,
            Err(e) => tracing::warn!("Could not load cache timestamps: {:#}", e),
        }
        self.persist_path = Some(path);
        self
    }

    pub fn is_fresh(&self, bucket: &str) -> bool {
        let Some(refreshed_at) = self.last_refresh(bucket) else {
            return false;
        };
        let ttl_hours = self.config.cache_ttl_hours().min(MAX_TTL_HOURS) as i64;
        let age = self.clock.now().signed_duration_since(refreshed_at);
        age >= Duration::zero() && age < Duration::hours(ttl_hours)
    }

    pub fn mark_refreshed(&self, bucket: &str) {
        let now = self.clock.now();
        lock(&*self.stamps).insert(bucket.to_string(), now);
        tracing::debug!(bucket, "cache bucket refreshed");
        self.persist();
    }

    pub fn clear(&self, bucket: &str) {
        lock(&*self.stamps).remove(bucket);
        self.persist();
    }

    pub fn clear_all(&self) {
        lock(&*self.stamps).clear();
        self.persist();
    }

    pub fn last_refresh(&self, bucket: &str) -> Option<DateTime<Utc>> {
        lock(&*self.stamps).get(bucket).copied()
    }

    /// Write the current stamps to disk, on the blocking pool when called
    /// from inside a runtime.
    fn persist(&self) {
        let Some(path) = self.persist_path.clone() else {
            return;
        };
        let stamps = Arc::clone(&self.stamps);
        let write_lock = Arc::clone(&self.write_lock);
        let write = move || {
            // Snapshot under the write lock so the last writer saves the latest state.
            let _guard = lock(&*write_lock);
            let snapshot = lock(&*stamps).clone();
            if let Err(e) = save_stamps(&path, &snapshot) {
                tracing::warn!("Could not save cache timestamps: {:#}", e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

fn load_stamps(path: &Path) -> Result<HashMap<String, DateTime<Utc>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path).context("Failed to read cache timestamps")?;
    let persisted: PersistedStamps =
        serde_json::from_str(&contents).context("Failed to parse cache timestamps")?;
    Ok(persisted
        .buckets
        .into_iter()
        .filter_map(|(bucket, ms)| DateTime::from_timestamp_millis(ms).map(|at| (bucket, at)))
        .collect())
}

fn save_stamps(path: &Path, stamps: &HashMap<String, DateTime<Utc>>) -> Result<()> {
    let persisted = PersistedStamps {
        buckets: stamps
            .iter()
            .map(|(bucket, at)| (bucket.clone(), at.timestamp_millis()))
            .collect(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(&persisted)?)?;
    Ok(())
}

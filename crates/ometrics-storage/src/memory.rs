use crate::error::{Result, StorageError};
use crate::{MetricStorage, MetricValues};
use ometrics_common::types::{MetricKind, MetricValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig {
    /// Snapshot file; `None` disables persistence entirely.
    pub file_path: Option<PathBuf>,
    /// Period of the background flush. Zero flushes after every update.
    pub store_interval: Duration,
    /// Load the snapshot file at construction.
    pub restore: bool,
}

/// One line of the snapshot file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum SnapshotEntry {
    Gauge { name: String, value: f64 },
    Counter { name: String, value: i64 },
}

/// In-memory metric store with optional JSON snapshot persistence.
///
/// Gauges and counters live in separate maps, each behind its own lock, so
/// readers of one kind never wait on writers of the other.
pub struct MemoryStorage {
    gauges: RwLock<HashMap<String, f64>>,
    counters: RwLock<HashMap<String, i64>>,
    file_path: Option<PathBuf>,
    store_interval: Duration,
    flush_lock: Mutex<()>,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        let storage = Self {
            gauges: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            file_path: config.file_path,
            store_interval: config.store_interval,
            flush_lock: Mutex::new(()),
        };
        if config.restore {
            if let Err(e) = storage.restore() {
                tracing::error!(error = %e, "Failed to restore metrics snapshot");
            }
        }
        storage
    }

    /// Store without persistence.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    fn read_gauges(&self) -> RwLockReadGuard<'_, HashMap<String, f64>> {
        self.gauges
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_gauges(&self) -> RwLockWriteGuard<'_, HashMap<String, f64>> {
        self.gauges
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_counters(&self) -> RwLockReadGuard<'_, HashMap<String, i64>> {
        self.counters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_counters(&self) -> RwLockWriteGuard<'_, HashMap<String, i64>> {
        self.counters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_synchronous(&self) -> bool {
        self.file_path.is_some() && self.store_interval.is_zero()
    }

    fn after_update(&self) {
        if self.is_synchronous() {
            if let Err(e) = self.flush() {
                tracing::error!(error = %e, "Synchronous flush failed");
            }
        }
    }

    /// Writes the current values to the snapshot file.
    ///
    /// The file is written to a temporary sibling and renamed over the
    /// target, so a reader sees either the old or the new snapshot.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = self.file_path.as_deref() else {
            return Ok(());
        };
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut entries: Vec<SnapshotEntry> = self
            .read_gauges()
            .iter()
            .map(|(name, value)| SnapshotEntry::Gauge {
                name: name.clone(),
                value: *value,
            })
            .collect();
        entries.extend(
            self.read_counters()
                .iter()
                .map(|(name, value)| SnapshotEntry::Counter {
                    name: name.clone(),
                    value: *value,
                }),
        );
        let body = serde_json::to_vec(&entries)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| persistence(dir, e))?;
        }
        let tmp = temp_sibling(path);
        std::fs::write(&tmp, body).map_err(|e| persistence(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| persistence(path, e))?;
        tracing::debug!(path = %path.display(), count = entries.len(), "Flushed metrics snapshot");
        Ok(())
    }

    /// Loads the snapshot file, setting every stored value directly.
    /// A missing file is not an error; entries that do not decode are skipped.
    pub fn restore(&self) -> Result<()> {
        let Some(path) = self.file_path.as_deref() else {
            return Ok(());
        };
        let body = match std::fs::read(path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No metrics snapshot to restore");
                return Ok(());
            }
            Err(e) => return Err(persistence(path, e)),
        };
        let raw: Vec<serde_json::Value> = serde_json::from_slice(&body)?;

        let mut count = 0;
        let mut skipped = 0;
        let mut gauges = self.write_gauges();
        let mut counters = self.write_counters();
        for value in raw {
            match serde_json::from_value::<SnapshotEntry>(value) {
                Ok(SnapshotEntry::Gauge { name, value }) if value.is_finite() => {
                    gauges.insert(name, value);
                    count += 1;
                }
                Ok(SnapshotEntry::Counter { name, value }) => {
                    counters.insert(name, value);
                    count += 1;
                }
                Ok(SnapshotEntry::Gauge { name, .. }) => {
                    tracing::warn!(name = %name, "Skipping non-finite gauge in snapshot");
                    skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed snapshot entry");
                    skipped += 1;
                }
            }
        }
        tracing::info!(path = %path.display(), count, skipped, "Restored metrics snapshot");
        Ok(())
    }

    /// Spawns the periodic flush task. Returns `None` when persistence is
    /// disabled or the store flushes synchronously.
    ///
    /// The task flushes once more when `cancel` fires.
    pub fn spawn_flush_loop(
        self: &Arc<Self>,
        cancel: CancellationToken,
        span: Span,
    ) -> Option<JoinHandle<()>> {
        if self.file_path.is_none() || self.store_interval.is_zero() {
            return None;
        }
        let storage = Arc::clone(self);
        let period = self.store_interval;
        let handle = tokio::spawn(
            async move {
                let mut tick = interval_at(Instant::now() + period, period);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick.tick() => {
                            if let Err(e) = storage.flush() {
                                tracing::error!(error = %e, "Periodic flush failed");
                            }
                        }
                    }
                }
                storage.close();
            }
            .instrument(span),
        );
        Some(handle)
    }

    /// Final flush on shutdown. Failures are logged, never returned.
    pub fn close(&self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "Final flush failed");
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn persistence(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Persistence {
        path: path.to_path_buf(),
        source,
    }
}

impl MetricStorage for MemoryStorage {
    fn update_gauge(&self, name: &str, value: f64) -> Result<()> {
        MetricValue::gauge(value)?;
        self.write_gauges().insert(name.to_string(), value);
        self.after_update();
        Ok(())
    }

    fn update_counter(&self, name: &str, delta: i64) -> Result<()> {
        {
            let mut counters = self.write_counters();
            let total = counters.entry(name.to_string()).or_insert(0);
            *total = total.wrapping_add(delta);
        }
        self.after_update();
        Ok(())
    }

    fn get_gauge_value(&self, name: &str) -> Result<f64> {
        self.read_gauges()
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotFound {
                kind: MetricKind::Gauge,
                name: name.to_string(),
            })
    }

    fn get_counter_value(&self, name: &str) -> Result<i64> {
        self.read_counters()
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotFound {
                kind: MetricKind::Counter,
                name: name.to_string(),
            })
    }

    fn get_all_values(&self) -> Result<MetricValues> {
        let gauges = self
            .read_gauges()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        let counters = self
            .read_counters()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Ok(MetricValues { gauges, counters })
    }

    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

//! Server-side metric storage.
//!
//! Two engines implement [`MetricStorage`]:
//! [`memory::MemoryStorage`] keeps live values in memory and snapshots them
//! to a JSON file, [`sqlite::SqliteStorage`] appends every update to a SQLite
//! table and derives live values by aggregation.

pub mod error;
pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};

use ometrics_common::types::{MetricSample, MetricValue};
use std::collections::BTreeMap;

/// Point-in-time copy of every live metric, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricValues {
    pub gauges: BTreeMap<String, f64>,
    pub counters: BTreeMap<String, i64>,
}

impl MetricValues {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }
}

/// Persistence backend for live metric values.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because every HTTP handler holds the same instance.
pub trait MetricStorage: Send + Sync {
    /// Replaces the gauge's value.
    fn update_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Adds `delta` to the counter, creating it at zero first if needed.
    fn update_counter(&self, name: &str, delta: i64) -> Result<()>;

    fn get_gauge_value(&self, name: &str) -> Result<f64>;

    fn get_counter_value(&self, name: &str) -> Result<i64>;

    fn get_all_values(&self) -> Result<MetricValues>;

    /// Reports whether the backend can serve requests.
    fn ping(&self) -> Result<()>;

    fn update_metric(&self, sample: &MetricSample) -> Result<()> {
        match sample.value {
            MetricValue::Gauge(value) => self.update_gauge(&sample.name, value),
            MetricValue::Counter(delta) => self.update_counter(&sample.name, delta),
        }
    }

    /// Applies every entry in order. Entries that fail are reported together
    /// in [`StorageError::Batch`]; the others stay applied.
    fn update_metrics(&self, batch: &[MetricSample]) -> Result<()> {
        let errors: Vec<StorageError> = batch
            .iter()
            .filter_map(|sample| self.update_metric(sample).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Batch(errors))
        }
    }
}

use ometrics_common::types::{MetricKind, MetricSample};
use ometrics_storage::{MetricStorage, MetricValues, StorageError};
use std::sync::Arc;

/// A storage failure tagged with the operation that hit it.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {source}")]
pub struct UseCaseError {
    pub op: &'static str,
    pub source: StorageError,
}

impl UseCaseError {
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }

    pub fn is_busy(&self) -> bool {
        self.source.is_busy()
    }

    pub fn is_invalid(&self) -> bool {
        self.source.is_invalid()
    }
}

pub type Result<T> = std::result::Result<T, UseCaseError>;

fn context(op: &'static str) -> impl FnOnce(StorageError) -> UseCaseError {
    move |source| UseCaseError { op, source }
}

/// Metric operations exposed to the HTTP layer, backed by one storage engine.
pub struct MetricUseCases {
    storage: Arc<dyn MetricStorage>,
}

impl MetricUseCases {
    pub fn new(storage: Arc<dyn MetricStorage>) -> Self {
        Self { storage }
    }

    pub fn update_metric(&self, sample: &MetricSample) -> Result<()> {
        self.storage
            .update_metric(sample)
            .map_err(context("update metric"))
    }

    pub fn update_metrics(&self, batch: &[MetricSample]) -> Result<()> {
        self.storage
            .update_metrics(batch)
            .map_err(context("update metrics"))
    }

    pub fn get_metric(&self, kind: MetricKind, name: &str) -> Result<MetricSample> {
        let sample = match kind {
            MetricKind::Gauge => self
                .storage
                .get_gauge_value(name)
                .map(|v| MetricSample::gauge(name, v)),
            MetricKind::Counter => self
                .storage
                .get_counter_value(name)
                .map(|v| MetricSample::counter(name, v)),
        };
        sample.map_err(context("get metric"))
    }

    pub fn get_all_metrics(&self) -> Result<MetricValues> {
        self.storage
            .get_all_values()
            .map_err(context("get all metrics"))
    }

    pub fn ping(&self) -> Result<()> {
        self.storage.ping().map_err(context("ping"))
    }
}

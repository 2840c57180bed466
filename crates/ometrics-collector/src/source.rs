use crate::{Collector, SampleProvider};
use anyhow::{Context, Result};
use ometrics_common::types::{MetricSample, SampleSet};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Periodically refreshed snapshot of all collector output.
///
/// Readers get the last completed [`SampleSet`] and never wait for a refresh
/// in progress: the refresh loop builds a complete new set and swaps it into
/// the slot in one step.
#[derive(Clone)]
pub struct SampleSource {
    current: Arc<RwLock<SampleSet>>,
}

impl SampleSource {
    /// Collects the first snapshot synchronously, then spawns the refresh
    /// loop. The loop stops when `cancel` fires.
    pub fn start(
        mut collectors: Vec<Box<dyn Collector>>,
        interval: Duration,
        cancel: CancellationToken,
        span: Span,
    ) -> (Self, JoinHandle<()>) {
        let initial = match collect_all(&mut collectors) {
            Ok(samples) => samples.into(),
            Err(e) => {
                span.in_scope(|| tracing::error!(error = %e, "Initial collection failed"));
                SampleSet::from(Vec::new())
            }
        };
        let source = Self {
            current: Arc::new(RwLock::new(initial)),
        };

        let slot = source.clone();
        let handle = tokio::spawn(
            async move {
                let mut tick = interval_at(Instant::now() + interval, interval);
                tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::debug!("Sampling loop stopped");
                            break;
                        }
                        _ = tick.tick() => slot.refresh(&mut collectors),
                    }
                }
            }
            .instrument(span),
        );

        (source, handle)
    }

    /// Returns the most recently completed snapshot.
    pub fn snapshot(&self) -> SampleSet {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn refresh(&self, collectors: &mut [Box<dyn Collector>]) {
        match collect_all(collectors) {
            Ok(samples) => {
                tracing::debug!(count = samples.len(), "Collected metrics");
                let next: SampleSet = samples.into();
                *self
                    .current
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
            }
            Err(e) => tracing::warn!(error = %e, "Collection failed, keeping previous snapshot"),
        }
    }
}

impl SampleProvider for SampleSource {
    fn snapshot(&self) -> SampleSet {
        SampleSource::snapshot(self)
    }
}

/// Runs every collector; the first failure aborts the cycle.
fn collect_all(collectors: &mut [Box<dyn Collector>]) -> Result<Vec<MetricSample>> {
    let mut all = Vec::new();
    for collector in collectors.iter_mut() {
        let name = collector.name().to_string();
        let points = collector
            .collect()
            .with_context(|| format!("collector '{name}' failed"))?;
        all.extend(points);
    }
    Ok(all)
}

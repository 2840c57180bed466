//! Periodic delivery of the current sample snapshot.
//!
//! On every report tick the producer reads one snapshot, splits it into
//! `worker_count` contiguous shards and queues them on a bounded channel.
//! Each worker sends the shards it receives through [`deliver`], which owns
//! retry and backoff. A shard that cannot be delivered is dropped; the next
//! tick carries a fresh snapshot.

use crate::transport::{SendOutcome, Transport, TransportError};
use ometrics_collector::SampleProvider;
use ometrics_common::types::{MetricSample, SampleSet};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Retry schedule for one shard.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// The wait after the i-th busy answer (0-based) is `(2i + 1)` units.
    pub backoff_unit: Duration,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        self.backoff_unit * (attempt_index * 2 + 1)
    }
}

/// Why a shard was given up on.
#[derive(Debug)]
pub enum DropReason {
    /// Every attempt was answered with "busy".
    Busy,
    /// A non-retryable failure, including an attempt past its deadline.
    Fatal(TransportError),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Busy => f.write_str("server busy on every attempt"),
            DropReason::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// Final outcome of delivering one shard.
#[derive(Debug)]
pub enum Delivery {
    Delivered { attempts: u32 },
    Dropped { attempts: u32, reason: DropReason },
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Delivery::Delivered { attempts } | Delivery::Dropped { attempts, .. } => *attempts,
        }
    }
}

/// Sends one shard, retrying only while the server answers "busy".
pub async fn deliver(transport: &dyn Transport, shard: &[MetricSample], policy: &RetryPolicy) -> Delivery {
    let max_attempts = policy.max_attempts.max(1);
    for index in 0..max_attempts {
        let attempts = index + 1;
        let outcome =
            match tokio::time::timeout(policy.attempt_timeout, transport.send_batch(shard)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Delivery::Dropped {
                        attempts,
                        reason: DropReason::Fatal(TransportError::Timeout(policy.attempt_timeout)),
                    }
                }
            };

        match outcome {
            SendOutcome::Success => return Delivery::Delivered { attempts },
            SendOutcome::Fatal(e) => {
                return Delivery::Dropped {
                    attempts,
                    reason: DropReason::Fatal(e),
                }
            }
            SendOutcome::Busy if attempts < max_attempts => {
                let wait = policy.backoff(index);
                tracing::debug!(attempt = attempts, wait_ms = wait.as_millis() as u64, "Server busy, retrying");
                tokio::time::sleep(wait).await;
            }
            SendOutcome::Busy => {}
        }
    }
    Delivery::Dropped {
        attempts: max_attempts,
        reason: DropReason::Busy,
    }
}

/// Splits `len` items into `workers` contiguous ranges in order.
///
/// Every range but the last holds `len / workers` items; the last one also
/// takes the remainder. With fewer items than workers the leading ranges
/// are empty.
///
/// # Examples
///
/// ```
/// use ometrics_agent::pipeline::partition;
///
/// assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
/// assert_eq!(partition(2, 3), vec![0..0, 0..0, 0..2]);
/// ```
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let part = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * part;
            let end = if i + 1 == workers { len } else { start + part };
            start..end
        })
        .collect()
}

/// A contiguous slice of one snapshot, shared without copying samples.
#[derive(Debug, Clone)]
pub struct Shard {
    set: SampleSet,
    range: Range<usize>,
}

impl Shard {
    pub fn samples(&self) -> &[MetricSample] {
        &self.set[self.range.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub report_interval: Duration,
    pub worker_count: usize,
    pub retry: RetryPolicy,
}

/// Counts of shard outcomes over the pipeline's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct Pipeline {
    provider: Arc<dyn SampleProvider>,
    transport: Arc<dyn Transport>,
    config: PipelineConfig,
    span: Span,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn SampleProvider>,
        transport: Arc<dyn Transport>,
        mut config: PipelineConfig,
        span: Span,
    ) -> Self {
        config.worker_count = config.worker_count.max(1);
        Self {
            provider,
            transport,
            config,
            span,
        }
    }

    /// Runs until `cancel` fires, then lets workers drain the queue and
    /// finish their in-flight sends.
    pub async fn send_metrics(&self, cancel: CancellationToken) -> PipelineReport {
        let workers = self.config.worker_count;
        let (tx, rx) = mpsc::channel::<Shard>(workers);
        let rx = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let rx = rx.clone();
            let transport = self.transport.clone();
            let retry = self.config.retry;
            pool.spawn(
                worker(rx, transport, retry)
                    .instrument(tracing::debug_span!(parent: &self.span, "sender", worker = id)),
            );
        }

        self.produce(tx, cancel).instrument(self.span.clone()).await;

        let mut report = PipelineReport::default();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(partial) => {
                    report.delivered += partial.delivered;
                    report.dropped += partial.dropped;
                }
                Err(e) => self.span.in_scope(|| tracing::error!(error = %e, "Sender task failed")),
            }
        }
        self.span.in_scope(|| {
            tracing::info!(delivered = report.delivered, dropped = report.dropped, "Delivery pipeline stopped")
        });
        report
    }

    async fn produce(&self, tx: mpsc::Sender<Shard>, cancel: CancellationToken) {
        let period = self.config.report_interval;
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            let set = self.provider.snapshot();
            if set.is_empty() {
                tracing::debug!("Snapshot is empty, nothing to report");
                continue;
            }
            tracing::debug!(count = set.len(), "Reporting snapshot");

            for range in partition(set.len(), self.config.worker_count) {
                if range.is_empty() {
                    continue;
                }
                let shard = Shard {
                    set: set.clone(),
                    range,
                };
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(shard) => {
                        if sent.is_err() {
                            tracing::warn!("All senders are gone, stopping producer");
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn worker(
    rx: Arc<Mutex<mpsc::Receiver<Shard>>>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    loop {
        let next = rx.lock().await.recv().await;
        let Some(shard) = next else {
            break;
        };
        let samples = shard.samples();
        match deliver(transport.as_ref(), samples, &retry).await {
            Delivery::Delivered { attempts } => {
                report.delivered += 1;
                tracing::debug!(count = samples.len(), attempts, "Shard delivered");
            }
            Delivery::Dropped { attempts, reason } => {
                report.dropped += 1;
                tracing::warn!(count = samples.len(), attempts, reason = %reason, "Shard dropped");
            }
        }
    }
    report
}

//! Metric collection framework for the ometrics agent.
//!
//! Each [`Collector`] implementation gathers one family of process or host
//! statistics and returns them as [`MetricSample`]s. A [`source::SampleSource`]
//! runs all collectors on a timer and publishes the combined result as one
//! immutable snapshot.

pub mod cpu;
pub mod memory;
pub mod poll;
pub mod runtime;
pub mod source;


use anyhow::Result;
use ometrics_common::types::{MetricSample, SampleSet};

/// A metric collector that runs on the agent host.
///
/// Collectors are owned by the sampling loop and called once per refresh.
/// The trait requires `Send` so the loop can run on the tokio runtime.
pub trait Collector: Send {
    /// Returns the collector name (e.g., `"memory"`), used for logging.
    fn name(&self) -> &str;

    /// Collects current metric values.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system query fails. The whole
    /// sampling cycle is then skipped.
    fn collect(&mut self) -> Result<Vec<MetricSample>>;
}

/// Anything that can hand out the latest completed sample set.
pub trait SampleProvider: Send + Sync {
    fn snapshot(&self) -> SampleSet;
}

/// The collectors the agent registers by default.
///
/// [`poll::PollCollector`] comes last so that a cycle skipped because of an
/// earlier failure does not advance the poll counter.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(runtime::RuntimeCollector::new()),
        Box::new(memory::MemoryCollector::new()),
        Box::new(cpu::CpuCollector::new()),
        Box::new(poll::PollCollector::new()),
    ]
}

use crate::Collector;
use anyhow::Result;
use ometrics_common::types::MetricSample;
use rand::Rng;

/// Counts refresh cycles and emits one random gauge per cycle.
///
/// `PollCount` carries the running number of polls, so it grows by exactly
/// one per successful call.
pub struct PollCollector {
    poll_count: i64,
}

impl PollCollector {
    pub fn new() -> Self {
        Self { poll_count: 0 }
    }
}

impl Default for PollCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for PollCollector {
    fn name(&self) -> &str {
        "poll"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>> {
        self.poll_count += 1;
        let random: f64 = rand::thread_rng().gen();

        Ok(vec![
            MetricSample::counter("PollCount", self.poll_count),
            MetricSample::gauge("RandomValue", random),
        ])
    }
}

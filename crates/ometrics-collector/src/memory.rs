use crate::Collector;
use anyhow::Result;
use ometrics_common::types::MetricSample;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            anyhow::bail!("host memory query returned no data");
        }
        let free = self.system.free_memory();

        Ok(vec![
            MetricSample::gauge("TotalMemory", total as f64),
            MetricSample::gauge("FreeMemory", free as f64),
        ])
    }
}

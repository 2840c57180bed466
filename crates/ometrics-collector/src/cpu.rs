use crate::Collector;
use anyhow::Result;
use ometrics_common::types::MetricSample;
use sysinfo::System;

/// Reports the number of logical CPUs.
pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>> {
        self.system.refresh_cpu_all();

        let logical = self.system.cpus().len();
        if logical == 0 {
            anyhow::bail!("no logical CPUs reported");
        }

        Ok(vec![MetricSample::gauge("CPUutilization1", logical as f64)])
    }
}

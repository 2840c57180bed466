use crate::Collector;
use anyhow::{anyhow, Result};
use ometrics_common::types::MetricSample;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Statistics of the agent's own process, read once per refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessStats {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
    pub cpu_usage: f32,
    pub run_time_secs: u64,
    pub start_time_secs: u64,
    pub read_bytes: u64,
    pub total_read_bytes: u64,
    pub written_bytes: u64,
    pub total_written_bytes: u64,
}

type Accessor = fn(&ProcessStats) -> f64;

/// Every tracked process field, one gauge each.
pub const PROCESS_GAUGES: &[(&str, Accessor)] = &[
    ("ResidentMemory", |s| s.resident_bytes as f64),
    ("VirtualMemory", |s| s.virtual_bytes as f64),
    ("ProcessCPUUsage", |s| f64::from(s.cpu_usage)),
    ("RunTime", |s| s.run_time_secs as f64),
    ("StartTime", |s| s.start_time_secs as f64),
    ("DiskReadBytes", |s| s.read_bytes as f64),
    ("DiskTotalReadBytes", |s| s.total_read_bytes as f64),
    ("DiskWrittenBytes", |s| s.written_bytes as f64),
    ("DiskTotalWrittenBytes", |s| s.total_written_bytes as f64),
];

/// Maps a [`ProcessStats`] to samples through [`PROCESS_GAUGES`].
pub fn process_samples(stats: &ProcessStats) -> Vec<MetricSample> {
    PROCESS_GAUGES
        .iter()
        .map(|(name, read)| MetricSample::gauge(*name, read(stats)))
        .collect()
}

pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot determine agent pid");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    fn read_stats(&mut self) -> Result<ProcessStats> {
        let pid = self
            .pid
            .ok_or_else(|| anyhow!("current process id is unavailable"))?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| anyhow!("process {pid} not found"))?;
        let disk = process.disk_usage();

        Ok(ProcessStats {
            resident_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            cpu_usage: process.cpu_usage(),
            run_time_secs: process.run_time(),
            start_time_secs: process.start_time(),
            read_bytes: disk.read_bytes,
            total_read_bytes: disk.total_read_bytes,
            written_bytes: disk.written_bytes,
            total_written_bytes: disk.total_written_bytes,
        })
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<MetricSample>> {
        let stats = self.read_stats()?;
        Ok(process_samples(&stats))
    }
}

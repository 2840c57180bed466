use anyhow::{bail, Context};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent senders per report tick.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Shared HMAC key; requests are signed only when set.
    pub signing_key: Option<String>,
    #[serde(default = "default_gzip")]
    pub gzip: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_server_endpoint() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_worker_count() -> usize {
    1
}

fn default_gzip() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_endpoint: default_server_endpoint(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            worker_count: default_worker_count(),
            signing_key: None,
            gzip: default_gzip(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read agent config '{path}'"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Applies `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`, `RATE_LIMIT`
    /// and `KEY` from the process environment.
    pub fn apply_env(self) -> anyhow::Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(addr) = lookup("ADDRESS") {
            self.server_endpoint = addr;
        }
        if let Some(raw) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = parse_env("POLL_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = parse_env("REPORT_INTERVAL", &raw)?;
        }
        if let Some(raw) = lookup("RATE_LIMIT") {
            self.worker_count = parse_env("RATE_LIMIT", &raw)?;
        }
        if let Some(key) = lookup("KEY") {
            self.signing_key = Some(key);
        }
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.server_endpoint.trim().is_empty() {
            bail!("server_endpoint must not be empty");
        }
        Ok(())
    }

    /// Server base URL with a scheme; bare `host:port` gets `http://`.
    pub fn endpoint_url(&self) -> String {
        let addr = self.server_endpoint.trim();
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> anyhow::Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value '{raw}' for {name}"))
}

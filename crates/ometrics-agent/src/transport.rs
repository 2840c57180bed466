//! Wire client that ships one shard of samples to the server.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use ometrics_common::signing::{self, SIGNATURE_HEADER};
use ometrics_common::types::{MetricPayload, MetricSample};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::io::Write;

/// Errors raised while encoding or sending a batch.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport: JSON encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport: gzip compression failed: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Transport: server answered with status {0}")]
    Status(u16),

    #[error("Transport: no answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport: invalid server endpoint '{0}'")]
    Endpoint(String),
}

/// Result of a single send attempt.
#[derive(Debug)]
pub enum SendOutcome {
    /// The server stored the whole batch.
    Success,
    /// The server is temporarily contended; the batch may be retried.
    Busy,
    /// Anything else. Never retried.
    Fatal(TransportError),
}

/// Sends one batch of samples in a single wire call.
///
/// Implementations perform exactly one attempt; retry and backoff are the
/// caller's business (see [`crate::pipeline::deliver`]).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_batch(&self, batch: &[MetricSample]) -> SendOutcome;
}

/// Maps the server's response status to an outcome.
pub fn classify(status: StatusCode) -> SendOutcome {
    match status {
        StatusCode::OK => SendOutcome::Success,
        StatusCode::LOCKED => SendOutcome::Busy,
        other => SendOutcome::Fatal(TransportError::Status(other.as_u16())),
    }
}

/// Posts JSON batches to `{server}/updates`, optionally gzipped and signed.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    gzip: bool,
    signing_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        server_endpoint: &str,
        gzip: bool,
        signing_key: Option<String>,
    ) -> Result<Self, TransportError> {
        let base = server_endpoint.trim().trim_end_matches('/');
        let url = Url::parse(&format!("{base}/updates"))
            .map_err(|_| TransportError::Endpoint(server_endpoint.to_string()))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url,
            gzip,
            signing_key: signing_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Serializes the batch to the wire body, gzipped when enabled.
    pub fn encode_body(&self, batch: &[MetricSample]) -> Result<Vec<u8>, TransportError> {
        let payload: Vec<MetricPayload> = batch.iter().map(MetricPayload::from).collect();
        let json = serde_json::to_vec(&payload)?;
        if !self.gzip {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Signature header value for an encoded body, if a key is configured.
    pub fn signature(&self, body: &[u8]) -> Option<String> {
        self.signing_key
            .as_deref()
            .map(|key| signing::sign(key, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, batch: &[MetricSample]) -> SendOutcome {
        let body = match self.encode_body(batch) {
            Ok(body) => body,
            Err(e) => return SendOutcome::Fatal(e),
        };

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json");
        if self.gzip {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(signature) = self.signature(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        match request.body(body).send().await {
            Ok(resp) => classify(resp.status()),
            Err(e) => SendOutcome::Fatal(e.into()),
        }
    }
}

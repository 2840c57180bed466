use crate::types::MetricKind;

/// Errors raised while parsing metrics at a boundary (HTTP request, wire
/// payload, persisted snapshot).
///
/// None of these are retryable: the caller sent something malformed.
///
/// # Examples
///
/// ```rust
/// use ometrics_common::error::MetricError;
///
/// let err = MetricError::InvalidMetricKind("histogram".to_string());
/// assert!(err.to_string().contains("histogram"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// The metric type is neither `gauge` nor `counter`.
    #[error("Metric: unknown metric kind '{0}'")]
    InvalidMetricKind(String),

    /// A field required for this kind is absent.
    #[error("Metric: {kind} is missing required field '{field}'")]
    MissingValue {
        kind: MetricKind,
        field: &'static str,
    },

    /// The textual value cannot be parsed for this kind.
    #[error("Metric: invalid {kind} value '{raw}'")]
    InvalidValue { kind: MetricKind, raw: String },
}

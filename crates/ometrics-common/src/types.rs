use crate::error::MetricError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kind of a metric: gauges are overwritten, counters accumulate.
///
/// # Examples
///
/// ```
/// use ometrics_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("Counter".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::InvalidMetricKind(s.to_string())),
        }
    }
}

/// A metric value; the variant carries the kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    /// A gauge value, rejecting `NaN` and infinities.
    pub fn gauge(value: f64) -> Result<Self, MetricError> {
        if value.is_finite() {
            Ok(MetricValue::Gauge(value))
        } else {
            Err(MetricError::InvalidValue {
                kind: MetricKind::Gauge,
                raw: value.to_string(),
            })
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parses a textual value according to `kind` (`"12.5"` for gauges,
    /// `"-3"` for counters). `NaN` and infinities are not valid gauges.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, MetricError> {
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(|| MetricError::InvalidValue {
                    kind,
                    raw: raw.to_string(),
                }),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| MetricError::InvalidValue {
                    kind,
                    raw: raw.to_string(),
                }),
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(v) => write!(f, "{v}"),
        }
    }
}

/// One named metric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: MetricValue,
}

impl MetricSample {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Immutable result of one sampling cycle, cheap to hand out to readers.
pub type SampleSet = Arc<[MetricSample]>;

/// JSON representation of a metric exchanged between agent and server.
///
/// Exactly one of `value` (gauges) or `delta` (counters) is present.
///
/// # Examples
///
/// ```
/// use ometrics_common::types::{MetricPayload, MetricSample};
///
/// let json = serde_json::to_string(&MetricPayload::from(&MetricSample::counter("PollCount", 3))).unwrap();
/// assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":3}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl From<&MetricSample> for MetricPayload {
    fn from(sample: &MetricSample) -> Self {
        let (value, delta) = match sample.value {
            MetricValue::Gauge(v) => (Some(v), None),
            MetricValue::Counter(d) => (None, Some(d)),
        };
        Self {
            id: sample.name.clone(),
            kind: sample.kind().to_string(),
            value,
            delta,
        }
    }
}

impl TryFrom<MetricPayload> for MetricSample {
    type Error = MetricError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        let kind: MetricKind = payload.kind.parse()?;
        if payload.id.is_empty() {
            return Err(MetricError::MissingValue {
                kind,
                field: "id",
            });
        }
        let value = match kind {
            MetricKind::Gauge => {
                let value = payload.value.ok_or(MetricError::MissingValue {
                    kind,
                    field: "value",
                })?;
                MetricValue::gauge(value)?
            }
            MetricKind::Counter => payload
                .delta
                .map(MetricValue::Counter)
                .ok_or(MetricError::MissingValue {
                    kind,
                    field: "delta",
                })?,
        };
        Ok(Self {
            name: payload.id,
            value,
        })
    }
}

/// Request body of `POST /value`: only the name and kind are meaningful.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("metric id must not be empty")]
    EmptyId,

    #[error("counter {0} has no delta")]
    MissingDelta(String),

    #[error("gauge {0} has no value")]
    MissingValue(String),

    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} value: {value}")]
    InvalidValue { kind: MetricKind, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }

    /// Parses a textual value into this kind, as used by the URL endpoints.
    pub fn parse_value(&self, raw: &str) -> Result<MetricValue, ModelError> {
        let invalid = || ModelError::InvalidValue {
            kind: *self,
            value: raw.to_string(),
        };
        match self {
            MetricKind::Counter => raw.parse::<i64>().map(MetricValue::Counter).map_err(|_| invalid()),
            MetricKind::Gauge => {
                let v = raw.parse::<f64>().map_err(|_| invalid())?;
                if v.is_finite() {
                    Ok(MetricValue::Gauge(v))
                } else {
                    Err(invalid())
                }
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// A counter carries a delta to accumulate, a gauge an absolute reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(d) => write!(f, "{d}"),
            MetricValue::Gauge(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Output of a single source read, in source order.
pub type RawMetricSnapshot = Vec<Metric>;

/// Metrics accumulated by the poller between two reports, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    metrics: HashMap<String, Metric>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one metric in. Gauges overwrite; counter deltas add up so that
    /// several polls between two reports are not lost.
    pub fn merge(&mut self, metric: Metric) {
        match self.metrics.get_mut(&metric.name) {
            Some(existing) => match (&mut existing.value, metric.value) {
                (MetricValue::Counter(total), MetricValue::Counter(delta)) => {
                    *total = total.wrapping_add(delta);
                }
                _ => *existing = metric,
            },
            None => {
                self.metrics.insert(metric.name.clone(), metric);
            }
        }
    }

    pub fn merge_snapshot(&mut self, snapshot: RawMetricSnapshot) {
        for metric in snapshot {
            self.merge(metric);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Wire records sorted by name, so payloads are deterministic.
    pub fn to_records(&self) -> Vec<MetricRecord> {
        let mut records: Vec<MetricRecord> = self.metrics.values().map(MetricRecord::from).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

/// JSON shape of one metric on the wire and in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricRecord {
    /// A record without a value, used to ask the server for the current one.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    pub fn into_metric(self) -> Result<Metric, ModelError> {
        if self.id.is_empty() {
            return Err(ModelError::EmptyId);
        }
        let value = match self.kind {
            MetricKind::Counter => MetricValue::Counter(self.delta.ok_or_else(|| ModelError::MissingDelta(self.id.clone()))?),
            MetricKind::Gauge => MetricValue::Gauge(self.value.ok_or_else(|| ModelError::MissingValue(self.id.clone()))?),
        };
        Ok(Metric { name: self.id, value })
    }
}

impl From<&Metric> for MetricRecord {
    fn from(m: &Metric) -> Self {
        match m.value {
            MetricValue::Counter(d) => Self {
                id: m.name.clone(),
                kind: MetricKind::Counter,
                delta: Some(d),
                value: None,
            },
            MetricValue::Gauge(v) => Self {
                id: m.name.clone(),
                kind: MetricKind::Gauge,
                delta: None,
                value: Some(v),
            },
        }
    }
}

impl From<Metric> for MetricRecord {
    fn from(m: Metric) -> Self {
        MetricRecord::from(&m)
    }
}

/// The file snapshot: `{"list": [record, ...]}`, rewritten wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub list: Vec<MetricRecord>,
}

impl SnapshotDocument {
    pub fn from_maps(counters: &HashMap<String, i64>, gauges: &HashMap<String, f64>) -> Self {
        let mut list: Vec<MetricRecord> = counters
            .iter()
            .map(|(name, delta)| MetricRecord::from(Metric::counter(name.clone(), *delta)))
            .chain(gauges.iter().map(|(name, value)| MetricRecord::from(Metric::gauge(name.clone(), *value))))
            .collect();
        list.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()).then_with(|| a.id.cmp(&b.id)));
        Self { list }
    }

    /// Splits the list back into counter and gauge maps. Records that fail
    /// validation are skipped and returned as errors.
    pub fn into_maps(self) -> (HashMap<String, i64>, HashMap<String, f64>, Vec<ModelError>) {
        let mut counters = HashMap::new();
        let mut gauges = HashMap::new();
        let mut errors = Vec::new();
        for record in self.list {
            match record.into_metric() {
                Ok(Metric { name, value: MetricValue::Counter(d) }) => {
                    counters.insert(name, d);
                }
                Ok(Metric { name, value: MetricValue::Gauge(v) }) => {
                    gauges.insert(name, v);
                }
                Err(e) => errors.push(e),
            }
        }
        (counters, gauges, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_merge_overwrites_gauges_and_adds_counters() {
        let mut batch = MetricBatch::new();
        batch.merge(Metric::gauge("Alloc", 512.0));
        batch.merge(Metric::counter("PollCount", 1));
        batch.merge(Metric::gauge("Alloc", 1024.0));
        batch.merge(Metric::counter("PollCount", 1));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("Alloc").map(|m| m.value), Some(MetricValue::Gauge(1024.0)));
        assert_eq!(batch.get("PollCount").map(|m| m.value), Some(MetricValue::Counter(2)));
    }

    #[test]
    fn record_json_shape() {
        let json = serde_json::to_string(&MetricRecord::from(Metric::counter("PollCount", 3))).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":3}"#);

        let json = serde_json::to_string(&MetricRecord::from(Metric::gauge("Alloc", 1.5))).unwrap();
        assert_eq!(json, r#"{"id":"Alloc","type":"gauge","value":1.5}"#);
    }

    #[test]
    fn record_round_trips_through_json() {
        for metric in [Metric::counter("c", -7), Metric::gauge("g", 0.25)] {
            let json = serde_json::to_vec(&MetricRecord::from(&metric)).unwrap();
            let back: MetricRecord = serde_json::from_slice(&json).unwrap();
            assert_eq!(back.into_metric().unwrap(), metric);
        }
    }

    #[test]
    fn record_validation() {
        assert_eq!(MetricRecord::query("", MetricKind::Gauge).into_metric(), Err(ModelError::EmptyId));
        assert_eq!(
            MetricRecord::query("x", MetricKind::Counter).into_metric(),
            Err(ModelError::MissingDelta("x".into()))
        );
        assert_eq!(
            MetricRecord::query("x", MetricKind::Gauge).into_metric(),
            Err(ModelError::MissingValue("x".into()))
        );
        assert!(serde_json::from_str::<MetricRecord>(r#"{"id":"x","type":"histogram"}"#).is_err());
    }

    #[test]
    fn parse_text_values() {
        assert_eq!(MetricKind::Counter.parse_value("42").unwrap(), MetricValue::Counter(42));
        assert_eq!(MetricKind::Gauge.parse_value("-1.5").unwrap(), MetricValue::Gauge(-1.5));
        assert!(MetricKind::Counter.parse_value("1.5").is_err());
        assert!(MetricKind::Gauge.parse_value("abc").is_err());
        assert!(MetricKind::Gauge.parse_value("NaN").is_err());
        assert!("histogram".parse::<MetricKind>().is_err());
    }

    #[test]
    fn snapshot_document_round_trip() {
        let counters = HashMap::from([("PollCount".to_string(), 10_i64)]);
        let gauges = HashMap::from([("Alloc".to_string(), 1024.0_f64)]);
        let doc = SnapshotDocument::from_maps(&counters, &gauges);

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.starts_with(r#"{"list":["#));

        let parsed: SnapshotDocument = serde_json::from_str(&json).unwrap();
        let (c, g, errors) = parsed.into_maps();
        assert!(errors.is_empty());
        assert_eq!(c, counters);
        assert_eq!(g, gauges);
    }
}

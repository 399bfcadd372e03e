use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of a metric, which decides how its samples are aggregated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Sums values, for example the number of requests made.
    Counter,
    /// Tracks the fraction of samples that were `true`.
    Rate,
    /// Tracks the distribution of values, for example request durations.
    Trend,
    /// Keeps the most recent value, for example the number of active VUs.
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
            MetricKind::Gauge => "gauge",
        };
        write!(f, "{name}")
    }
}

/// Final aggregated values for a metric or sub-metric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValues {
    Counter {
        /// Sum of all recorded values
        count: f64,
        /// `count` divided by the run's elapsed time, per second
        rate: f64,
    },
    Rate {
        rate: f64,
        passes: u64,
        fails: u64,
    },
    /// Durations are in milliseconds. Percentiles are estimates from a histogram with three
    /// significant digits of precision.
    Trend {
        count: u64,
        avg: f64,
        min: f64,
        med: f64,
        max: f64,
        p90: f64,
        p95: f64,
        p99: f64,
    },
    Gauge {
        value: f64,
        min: f64,
        max: f64,
    },
}

impl MetricValues {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValues::Counter { .. } => MetricKind::Counter,
            MetricValues::Rate { .. } => MetricKind::Rate,
            MetricValues::Trend { .. } => MetricKind::Trend,
            MetricValues::Gauge { .. } => MetricKind::Gauge,
        }
    }
}

/// A metric, aggregated across all of its series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub values: MetricValues,
    /// The same metric restricted to a tag filter, for example `{scenario:steady_read}`.
    pub submetrics: Vec<SubMetricSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubMetricSummary {
    pub tags: BTreeMap<String, String>,
    pub values: MetricValues,
}

impl SubMetricSummary {
    /// The display name of this sub-metric, in the same form used to declare thresholds.
    pub fn label(&self, metric_name: &str) -> String {
        format_metric_expression(metric_name, &self.tags)
    }
}

/// Format a metric name and tag filter as `name{tag:value,other:value}`.
pub fn format_metric_expression(name: &str, tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return name.to_string();
    }

    let filter = tags
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}{{{filter}}}")
}

/// Pass/fail counts for a single named check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSummary {
    pub name: String,
    /// The scenario that ran the check, if the check was tagged with one.
    pub scenario: Option<String>,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            0.0
        } else {
            self.passes as f64 / total as f64
        }
    }
}

/// The outcome of evaluating one threshold at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdVerdict {
    /// The metric expression, for example `http_req_duration{scenario:steady_read}`.
    pub metric: String,
    /// The condition, for example `p(95)<400`.
    pub condition: String,
    /// The aggregate value the condition was checked against. Not set if the metric had no data or
    /// the aggregation could not be applied.
    pub observed: Option<f64>,
    pub passed: bool,
    /// Extra detail when the verdict was not a plain comparison.
    pub note: Option<String>,
}

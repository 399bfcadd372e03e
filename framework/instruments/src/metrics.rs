use crosswind_summary_model::MetricKind;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Tags attached to a sample. Ordered so that a tag set can be used as part of a series key.
pub type Tags = BTreeMap<String, String>;

/// Names of the metrics that Crosswind records itself.
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_WAITING: &str = "http_req_waiting";
    pub const HTTP_REQ_RECEIVING: &str = "http_req_receiving";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const CHECKS: &str = "checks";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const ITERATIONS_FAILED: &str = "iterations_failed";
    pub const ITERATIONS_INTERRUPTED: &str = "iterations_interrupted";
    pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";
}

/// Names of the tags that Crosswind sets itself.
pub mod tags {
    pub const SCENARIO: &str = "scenario";
    pub const METHOD: &str = "method";
    pub const NAME: &str = "name";
    pub const STATUS: &str = "status";
    pub const EXPECTED_RESPONSE: &str = "expected_response";
    pub const CHECK: &str = "check";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Counter(f64),
    Rate(bool),
    Trend(f64),
    Gauge(f64),
}

impl SampleValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleValue::Counter(_) => MetricKind::Counter,
            SampleValue::Rate(_) => MetricKind::Rate,
            SampleValue::Trend(_) => MetricKind::Trend,
            SampleValue::Gauge(_) => MetricKind::Gauge,
        }
    }
}

/// A single measurement. Samples are timestamped when they are created so that they can be
/// delivered to the registry in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub value: SampleValue,
    pub tags: Tags,
    pub timestamp: SystemTime,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: SampleValue) -> Self {
        Self {
            name: name.into(),
            value,
            tags: Tags::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: &Tags) -> Self {
        self.tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn at(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

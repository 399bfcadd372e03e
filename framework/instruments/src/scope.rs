use crate::metrics::{tags, Sample, SampleValue, Tags};
use crate::registry::MetricsRegistry;
use std::sync::Arc;
use std::time::SystemTime;

/// A handle for recording into a [MetricsRegistry] with a fixed set of base tags.
///
/// The runner creates one per scenario with the `scenario` tag set. It is cheap to clone and is
/// what the HTTP client and scenario code use to record samples and checks.
#[derive(Debug, Clone)]
pub struct MetricsScope {
    registry: Arc<MetricsRegistry>,
    tags: Tags,
}

impl MetricsScope {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self {
            registry,
            tags: Tags::new(),
        }
    }

    pub fn for_scenario(registry: Arc<MetricsRegistry>, scenario: &str) -> Self {
        Self::new(registry).with_tag(tags::SCENARIO, scenario)
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Record a sample with the base tags plus `extra_tags`. Extra tags win over base tags with the
    /// same name.
    pub fn record(&self, name: &str, value: SampleValue, extra_tags: Tags) {
        self.record_at(name, value, extra_tags, SystemTime::now());
    }

    /// Like [MetricsScope::record], for a measurement taken at `timestamp`.
    pub fn record_at(
        &self,
        name: &str,
        value: SampleValue,
        extra_tags: Tags,
        timestamp: SystemTime,
    ) {
        let mut sample = Sample::new(name, value).with_tags(&self.tags).at(timestamp);
        sample.tags.extend(extra_tags);
        self.registry.record(sample);
    }

    pub fn add_counter(&self, name: &str, value: f64) {
        self.record(name, SampleValue::Counter(value), Tags::new());
    }

    pub fn add_trend(&self, name: &str, value: f64) {
        self.record(name, SampleValue::Trend(value), Tags::new());
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.record(name, SampleValue::Gauge(value), Tags::new());
    }

    /// Record a check. Returns `passed` so that it can be used in a condition.
    pub fn check(&self, label: &str, passed: bool) -> bool {
        self.registry.check(label, passed, &self.tags)
    }
}

use crate::metrics::{SampleValue, Tags};
use crate::scope::MetricsScope;
use std::time::{Duration, Instant, SystemTime};

/// Times one unit of work, such as an iteration, and reports its duration as a trend.
///
/// The sample is stamped with the wall clock time at which the work started.
pub struct OperationRecord {
    metric: String,
    started: Instant,
    started_at: SystemTime,
}

impl OperationRecord {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            started: Instant::now(),
            started_at: SystemTime::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }
}

/// Record the elapsed time of `record`, in milliseconds, to `scope`.
pub fn report_operation(
    record: OperationRecord,
    scope: &MetricsScope,
    extra_tags: Tags,
) -> Duration {
    let duration = record.elapsed();
    scope.record_at(
        &record.metric,
        SampleValue::Trend(duration.as_secs_f64() * 1000.0),
        extra_tags,
        record.started_at,
    );
    duration
}

//! Streaming, order independent aggregation of samples.
//!
//! Every operation here is commutative and associative so that workers can deliver samples in any
//! order, and so that series can be merged in any order when a threshold filters across them.
//! Sums are kept in fixed point because floating point addition is not associative.

use crate::metrics::SampleValue;
use crate::threshold::Aggregation;
use crosswind_summary_model::{MetricKind, MetricValues};
use hdrhistogram::Histogram;
use std::time::{Duration, SystemTime};

/// Sums are stored as millionths.
const SUM_SCALE: f64 = 1_000_000.0;

/// Trend values go into the histogram as thousandths, so millisecond durations keep microsecond
/// resolution.
const HISTOGRAM_SCALE: f64 = 1_000.0;

const HISTOGRAM_SIGNIFICANT_FIGURES: u8 = 3;

fn to_fixed(value: f64) -> i128 {
    (value * SUM_SCALE).round() as i128
}

fn from_fixed(value: i128) -> f64 {
    value as f64 / SUM_SCALE
}

#[derive(Debug, Clone)]
pub struct TrendAggregate {
    count: u64,
    sum: i128,
    min: f64,
    max: f64,
    histogram: Histogram<u64>,
}

impl TrendAggregate {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            histogram: Histogram::new(HISTOGRAM_SIGNIFICANT_FIGURES)
                .expect("3 significant figures is a valid histogram precision"),
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += to_fixed(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        // The histogram only holds non-negative values, min and max stay exact.
        let scaled = (value.max(0.0) * HISTOGRAM_SCALE).round() as u64;
        if let Err(e) = self.histogram.record(scaled) {
            log::warn!("Failed to record trend value {value}: {e:?}");
        }
    }

    fn merge(&mut self, other: &TrendAggregate) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        if let Err(e) = self.histogram.add(&other.histogram) {
            log::warn!("Failed to merge trend histograms: {e:?}");
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            from_fixed(self.sum) / self.count as f64
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Estimated percentile, `percentile` is in the range `0..=100`.
    pub fn percentile(&self, percentile: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let quantile = (percentile / 100.0).clamp(0.0, 1.0);
        let estimate = self.histogram.value_at_quantile(quantile) as f64 / HISTOGRAM_SCALE;
        estimate.clamp(self.min.max(0.0).min(self.max), self.max)
    }
}

/// The running aggregate of one series.
#[derive(Debug, Clone)]
pub enum Aggregate {
    Counter {
        samples: u64,
        sum: i128,
    },
    Rate {
        trues: u64,
        total: u64,
    },
    Trend(TrendAggregate),
    /// The value with the latest timestamp wins. Ties go to the larger value.
    Gauge {
        value: f64,
        at: SystemTime,
        min: f64,
        max: f64,
    },
}

impl Aggregate {
    pub fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Aggregate::Counter { samples: 0, sum: 0 },
            MetricKind::Rate => Aggregate::Rate { trues: 0, total: 0 },
            MetricKind::Trend => Aggregate::Trend(TrendAggregate::new()),
            MetricKind::Gauge => Aggregate::Gauge {
                value: 0.0,
                at: SystemTime::UNIX_EPOCH,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Aggregate::Counter { .. } => MetricKind::Counter,
            Aggregate::Rate { .. } => MetricKind::Rate,
            Aggregate::Trend(_) => MetricKind::Trend,
            Aggregate::Gauge { .. } => MetricKind::Gauge,
        }
    }

    /// Add a sample to this aggregate. Returns false, without changing anything, if the sample is
    /// for a different kind of metric or is not a number.
    pub fn observe(&mut self, sample: SampleValue, timestamp: SystemTime) -> bool {
        match (self, sample) {
            (_, SampleValue::Counter(v) | SampleValue::Trend(v) | SampleValue::Gauge(v))
                if v.is_nan() =>
            {
                false
            }
            (Aggregate::Counter { samples, sum }, SampleValue::Counter(v)) => {
                *samples += 1;
                *sum += to_fixed(v);
                true
            }
            (Aggregate::Rate { trues, total }, SampleValue::Rate(v)) => {
                *total += 1;
                if v {
                    *trues += 1;
                }
                true
            }
            (Aggregate::Trend(trend), SampleValue::Trend(v)) => {
                trend.observe(v);
                true
            }
            (
                Aggregate::Gauge {
                    value,
                    at,
                    min,
                    max,
                },
                SampleValue::Gauge(v),
            ) => {
                if timestamp > *at || (timestamp == *at && v > *value) {
                    *value = v;
                    *at = timestamp;
                }
                *min = min.min(v);
                *max = max.max(v);
                true
            }
            _ => false,
        }
    }

    /// Merge another aggregate of the same kind into this one.
    pub fn merge(&mut self, other: &Aggregate) {
        match (self, other) {
            (
                Aggregate::Counter { samples, sum },
                Aggregate::Counter {
                    samples: other_samples,
                    sum: other_sum,
                },
            ) => {
                *samples += other_samples;
                *sum += other_sum;
            }
            (
                Aggregate::Rate { trues, total },
                Aggregate::Rate {
                    trues: other_trues,
                    total: other_total,
                },
            ) => {
                *trues += other_trues;
                *total += other_total;
            }
            (Aggregate::Trend(trend), Aggregate::Trend(other)) => trend.merge(other),
            (
                Aggregate::Gauge {
                    value,
                    at,
                    min,
                    max,
                },
                Aggregate::Gauge {
                    value: other_value,
                    at: other_at,
                    min: other_min,
                    max: other_max,
                },
            ) => {
                if *other_at > *at || (*other_at == *at && *other_value > *value) {
                    *value = *other_value;
                    *at = *other_at;
                }
                *min = min.min(*other_min);
                *max = max.max(*other_max);
            }
            (this, other) => {
                log::warn!(
                    "Cannot merge a {} aggregate into a {} aggregate",
                    other.kind(),
                    this.kind()
                );
            }
        }
    }

    /// The value of an aggregation, or `None` if the aggregation does not apply to this kind of
    /// metric.
    pub fn value_of(&self, aggregation: &Aggregation, elapsed: Duration) -> Option<f64> {
        match (self, aggregation) {
            (Aggregate::Counter { sum, .. }, Aggregation::Count) => Some(from_fixed(*sum)),
            (Aggregate::Counter { sum, .. }, Aggregation::Rate) => {
                Some(per_second(from_fixed(*sum), elapsed))
            }
            (Aggregate::Rate { trues, total }, Aggregation::Rate) => Some(ratio(*trues, *total)),
            (Aggregate::Trend(trend), Aggregation::Count) => Some(trend.count() as f64),
            (Aggregate::Trend(trend), Aggregation::Avg) => Some(trend.avg()),
            (Aggregate::Trend(trend), Aggregation::Min) => Some(trend.min()),
            (Aggregate::Trend(trend), Aggregation::Max) => Some(trend.max()),
            (Aggregate::Trend(trend), Aggregation::Med) => Some(trend.percentile(50.0)),
            (Aggregate::Trend(trend), Aggregation::Percentile(p)) => Some(trend.percentile(*p)),
            (Aggregate::Gauge { value, .. }, Aggregation::Value) => Some(*value),
            (Aggregate::Gauge { min, .. }, Aggregation::Min) => Some(*min),
            (Aggregate::Gauge { max, .. }, Aggregation::Max) => Some(*max),
            _ => None,
        }
    }

    pub fn to_values(&self, elapsed: Duration) -> MetricValues {
        match self {
            Aggregate::Counter { sum, .. } => {
                let count = from_fixed(*sum);
                MetricValues::Counter {
                    count,
                    rate: per_second(count, elapsed),
                }
            }
            Aggregate::Rate { trues, total } => MetricValues::Rate {
                rate: ratio(*trues, *total),
                passes: *trues,
                fails: total - trues,
            },
            Aggregate::Trend(trend) => MetricValues::Trend {
                count: trend.count(),
                avg: trend.avg(),
                min: trend.min(),
                med: trend.percentile(50.0),
                max: trend.max(),
                p90: trend.percentile(90.0),
                p95: trend.percentile(95.0),
                p99: trend.percentile(99.0),
            },
            Aggregate::Gauge {
                value, min, max, ..
            } => MetricValues::Gauge {
                value: *value,
                min: if min.is_finite() { *min } else { 0.0 },
                max: if max.is_finite() { *max } else { 0.0 },
            },
        }
    }
}

fn ratio(trues: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        trues as f64 / total as f64
    }
}

fn per_second(count: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count / secs
    } else {
        0.0
    }
}

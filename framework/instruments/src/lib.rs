//! Metrics collection, threshold evaluation and summary rendering for Crosswind.

mod aggregate;
mod metrics;
mod operation;
mod registry;
pub mod report;
mod scope;
mod threshold;

pub use aggregate::{Aggregate, TrendAggregate};
pub use metrics::{names, tags, Sample, SampleValue, Tags};
pub use operation::{report_operation, OperationRecord};
pub use registry::{MetricsRegistry, MetricsSnapshot, SeriesSnapshot};
pub use scope::MetricsScope;
pub use threshold::{evaluate, Aggregation, Comparator, Threshold, ThresholdParseError};

pub mod prelude {
    pub use crate::metrics::{names, tags, SampleValue, Tags};
    pub use crate::operation::{report_operation, OperationRecord};
    pub use crate::registry::MetricsRegistry;
    pub use crate::scope::MetricsScope;
}

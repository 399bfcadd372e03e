//! Declarative pass/fail conditions over aggregated metrics.
//!
//! A threshold is declared as a metric expression and a condition:
//!
//! ```text
//! http_req_failed                          rate<0.01
//! http_req_duration{scenario:steady_read}  p(95)<400
//! checks                                   rate>0.95
//! ```

use crate::metrics::Tags;
use crate::registry::MetricsSnapshot;
use crosswind_summary_model::{format_metric_expression, ThresholdVerdict};

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    Value,
    /// A percentile in the range `0..=100`.
    Percentile(f64),
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Value => write!(f, "value"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn compare(&self, observed: f64, target: f64) -> bool {
        match self {
            Comparator::Lt => observed < target,
            Comparator::Le => observed <= target,
            Comparator::Gt => observed > target,
            Comparator::Ge => observed >= target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdParseError {
    #[error("Threshold metric expression `{0}` has no metric name")]
    EmptyMetric(String),
    #[error("Malformed tag filter in `{0}`, expected `name{{tag:value,...}}`")]
    MalformedFilter(String),
    #[error("No comparison in threshold condition `{0}`, expected one of <, <=, >, >=")]
    MissingComparator(String),
    #[error("Unknown aggregation `{aggregation}` in threshold condition `{condition}`")]
    UnknownAggregation {
        aggregation: String,
        condition: String,
    },
    #[error("Invalid threshold value in condition `{0}`")]
    InvalidValue(String),
    #[error("Percentile must be between 0 and 100 in condition `{0}`")]
    InvalidPercentile(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: String,
    filter: Tags,
    aggregation: Aggregation,
    comparator: Comparator,
    target: f64,
    condition: String,
}

impl Threshold {
    /// Parse a threshold from a metric expression, such as `http_req_duration{scenario:spike}`,
    /// and a condition, such as `p(95)<1000`.
    pub fn parse(metric_expression: &str, condition: &str) -> Result<Self, ThresholdParseError> {
        let (metric, filter) = parse_metric_expression(metric_expression)?;
        let (aggregation, comparator, target) = parse_condition(condition)?;

        Ok(Self {
            metric,
            filter,
            aggregation,
            comparator,
            target,
            condition: condition.split_whitespace().collect(),
        })
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn filter(&self) -> &Tags {
        &self.filter
    }

    pub fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn metric_expression(&self) -> String {
        format_metric_expression(&self.metric, &self.filter)
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Judge this threshold against a snapshot.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdVerdict {
        let verdict = |observed: Option<f64>, passed: bool, note: Option<String>| {
            ThresholdVerdict {
                metric: self.metric_expression(),
                condition: self.condition.clone(),
                observed,
                passed,
                note,
            }
        };

        let Some(aggregate) = snapshot.aggregate(&self.metric, &self.filter) else {
            return verdict(None, true, Some("no data".to_string()));
        };

        match aggregate.value_of(&self.aggregation, snapshot.elapsed()) {
            Some(observed) => verdict(
                Some(observed),
                self.comparator.compare(observed, self.target),
                None,
            ),
            None => verdict(
                None,
                false,
                Some(format!(
                    "`{}` does not apply to a {} metric",
                    self.aggregation,
                    aggregate.kind()
                )),
            ),
        }
    }
}

/// Evaluate every threshold against the final snapshot. The result is in the same order as
/// `thresholds`.
pub fn evaluate(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Vec<ThresholdVerdict> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}

fn parse_metric_expression(expression: &str) -> Result<(String, Tags), ThresholdParseError> {
    let expression = expression.trim();
    let (name, filter) = match expression.split_once('{') {
        Some((name, rest)) => {
            let filter = rest
                .strip_suffix('}')
                .ok_or_else(|| ThresholdParseError::MalformedFilter(expression.to_string()))?;
            (name.trim(), Some(filter))
        }
        None => (expression, None),
    };

    if name.is_empty() {
        return Err(ThresholdParseError::EmptyMetric(expression.to_string()));
    }
    if name.contains('}') {
        return Err(ThresholdParseError::MalformedFilter(expression.to_string()));
    }

    let mut tags = Tags::new();
    if let Some(filter) = filter {
        for pair in filter.split(',') {
            let (key, value) = pair
                .split_once(':')
                .ok_or_else(|| ThresholdParseError::MalformedFilter(expression.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ThresholdParseError::MalformedFilter(expression.to_string()));
            }
            tags.insert(key.to_string(), value.trim().to_string());
        }
    }

    Ok((name.to_string(), tags))
}

fn parse_condition(
    condition: &str,
) -> Result<(Aggregation, Comparator, f64), ThresholdParseError> {
    let compact = condition.split_whitespace().collect::<String>();

    let position = compact
        .find(['<', '>'])
        .ok_or_else(|| ThresholdParseError::MissingComparator(condition.to_string()))?;
    let (left, right) = compact.split_at(position);
    let (comparator, value) = if let Some(value) = right.strip_prefix("<=") {
        (Comparator::Le, value)
    } else if let Some(value) = right.strip_prefix(">=") {
        (Comparator::Ge, value)
    } else if let Some(value) = right.strip_prefix('<') {
        (Comparator::Lt, value)
    } else if let Some(value) = right.strip_prefix('>') {
        (Comparator::Gt, value)
    } else {
        return Err(ThresholdParseError::MissingComparator(condition.to_string()));
    };

    let target = value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ThresholdParseError::InvalidValue(condition.to_string()))?;

    let aggregation = match left {
        "rate" => Aggregation::Rate,
        "count" => Aggregation::Count,
        "avg" => Aggregation::Avg,
        "min" => Aggregation::Min,
        "max" => Aggregation::Max,
        "med" => Aggregation::Med,
        "value" => Aggregation::Value,
        other => {
            let percentile = other
                .strip_prefix("p(")
                .and_then(|p| p.strip_suffix(')'))
                .ok_or_else(|| ThresholdParseError::UnknownAggregation {
                    aggregation: other.to_string(),
                    condition: condition.to_string(),
                })?;
            let percentile = percentile
                .parse::<f64>()
                .map_err(|_| ThresholdParseError::InvalidPercentile(condition.to_string()))?;
            if !(0.0..=100.0).contains(&percentile) {
                return Err(ThresholdParseError::InvalidPercentile(condition.to_string()));
            }
            Aggregation::Percentile(percentile)
        }
    };

    Ok((aggregation, comparator, target))
}

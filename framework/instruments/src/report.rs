mod html_report;
mod text_report;

use crosswind_summary_model::{MetricValues, RunSummary};

pub use html_report::render_html;
pub use text_report::render_text;

/// The rendered artifacts for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSummary {
    pub text: String,
    pub html: String,
}

/// Render a run summary as plain text and as a self-contained HTML page.
///
/// This does no I/O, writing the artifacts out is up to the caller. An error means the embedded
/// HTML template is broken.
pub fn render(summary: &RunSummary) -> Result<RenderedSummary, minijinja::Error> {
    Ok(RenderedSummary {
        text: render_text(summary),
        html: render_html(summary)?,
    })
}

/// Format metric values on one line, for example `avg=12.30ms min=1.00ms ...`.
pub(crate) fn format_values(metric_name: &str, values: &MetricValues) -> String {
    match values {
        MetricValues::Counter { count, rate } => {
            format!("{} {}/s", format_number(*count), format_number(*rate))
        }
        MetricValues::Rate {
            rate,
            passes,
            fails,
        } => format!(
            "{:.2}% ({} of {})",
            rate * 100.0,
            passes,
            passes + fails
        ),
        MetricValues::Trend {
            avg,
            min,
            med,
            max,
            p90,
            p95,
            p99,
            ..
        } => {
            let unit = unit_for(metric_name);
            [
                ("avg", avg),
                ("min", min),
                ("med", med),
                ("max", max),
                ("p(90)", p90),
                ("p(95)", p95),
                ("p(99)", p99),
            ]
            .iter()
            .map(|(label, value)| format!("{label}={}{unit}", format_number(**value)))
            .collect::<Vec<_>>()
            .join(" ")
        }
        MetricValues::Gauge { value, min, max } => format!(
            "{} min={} max={}",
            format_number(*value),
            format_number(*min),
            format_number(*max)
        ),
    }
}

/// Durations recorded by Crosswind are in milliseconds.
fn unit_for(metric_name: &str) -> &'static str {
    if metric_name.contains("duration")
        || metric_name == "http_req_waiting"
        || metric_name == "http_req_receiving"
    {
        "ms"
    } else {
        ""
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub(crate) fn format_observed(observed: &Option<f64>) -> String {
    match observed {
        Some(value) => format_number(*value),
        None => "-".to_string(),
    }
}

pub(crate) fn format_started_at(started_at: i64) -> String {
    chrono::DateTime::from_timestamp(started_at, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| started_at.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_trend_values_with_units() {
        let values = MetricValues::Trend {
            count: 2,
            avg: 1.5,
            min: 1.0,
            med: 1.5,
            max: 2.0,
            p90: 2.0,
            p95: 2.0,
            p99: 2.0,
        };
        assert_eq!(
            "avg=1.50ms min=1ms med=1.50ms max=2ms p(90)=2ms p(95)=2ms p(99)=2ms",
            format_values("http_req_duration", &values)
        );
        assert!(!format_values("read_size", &values).contains("ms"));
    }

    #[test]
    fn format_rate_values() {
        let values = MetricValues::Rate {
            rate: 0.995,
            passes: 199,
            fails: 1,
        };
        assert_eq!("99.50% (199 of 200)", format_values("checks", &values));
    }

    #[test]
    fn render_is_pure() {
        let summary = test_data::sample_summary();
        assert_eq!(render(&summary).unwrap(), render(&summary).unwrap());
    }
}

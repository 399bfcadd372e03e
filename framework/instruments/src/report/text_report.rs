use super::{format_observed, format_started_at, format_values};
use crosswind_summary_model::RunSummary;
use std::fmt::Write;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "")]
    mark: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "Observed", display = "format_observed")]
    observed: Option<f64>,
    #[tabled(rename = "Note")]
    note: String,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "")]
    mark: String,
    #[tabled(rename = "Check")]
    name: String,
    #[tabled(rename = "Scenario")]
    scenario: String,
    #[tabled(rename = "Passes")]
    passes: u64,
    #[tabled(rename = "Fails")]
    fails: u64,
    #[tabled(rename = "Rate", display = "percent")]
    rate: f64,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Values")]
    values: String,
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}

fn mark(passed: bool) -> String {
    if passed { "✓" } else { "✗" }.to_string()
}

/// Render a run summary as fixed width text, suitable for a terminal or CI log.
pub fn render_text(summary: &RunSummary) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "Crosswind run summary");
    let _ = writeln!(out, "  scenario: {}", summary.scenario_name);
    let _ = writeln!(out, "  run id:   {}", summary.run_id);
    let _ = writeln!(out, "  started:  {}", format_started_at(summary.started_at));
    let _ = writeln!(out, "  executor: {}", summary.executor);
    let _ = write!(
        out,
        "  duration: {:.2}s elapsed",
        summary.elapsed_ms as f64 / 1000.0
    );
    if let Some(planned) = summary.run_duration {
        let _ = write!(out, " ({planned}s planned)");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "  peak VUs: {}", summary.peak_vus);

    let _ = writeln!(out, "\nThresholds");
    if summary.thresholds.is_empty() {
        let _ = writeln!(out, "  no thresholds");
    } else {
        let rows = summary.thresholds.iter().map(|t| ThresholdRow {
            mark: mark(t.passed),
            metric: t.metric.clone(),
            condition: t.condition.clone(),
            observed: t.observed,
            note: t.note.clone().unwrap_or_default(),
        });
        let mut table = Table::new(rows);
        table.with(Style::modern());
        let _ = writeln!(out, "{table}");
    }

    let _ = writeln!(out, "\nChecks");
    if summary.checks.is_empty() {
        let _ = writeln!(out, "  no checks");
    } else {
        let rows = summary.checks.iter().map(|c| CheckRow {
            mark: mark(c.fails == 0),
            name: c.name.clone(),
            scenario: c.scenario.clone().unwrap_or_default(),
            passes: c.passes,
            fails: c.fails,
            rate: c.rate(),
        });
        let mut table = Table::new(rows);
        table.with(Style::modern());
        let _ = writeln!(out, "{table}");
    }

    let _ = writeln!(out, "\nMetrics");
    let rows = summary
        .metrics
        .iter()
        .flat_map(|metric| {
            std::iter::once(MetricRow {
                metric: metric.name.clone(),
                kind: metric.kind.to_string(),
                values: format_values(&metric.name, &metric.values),
            })
            .chain(metric.submetrics.iter().map(|sub| MetricRow {
                metric: format!("  {}", sub.label(&metric.name)),
                kind: String::new(),
                values: format_values(&metric.name, &sub.values),
            }))
        })
        .collect::<Vec<_>>();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    let _ = writeln!(out, "{table}");

    let failed = summary.failed_thresholds().count();
    if failed == 0 {
        let _ = writeln!(out, "\nResult: PASSED");
    } else {
        let _ = writeln!(
            out,
            "\nResult: FAILED ({failed} of {} thresholds failed)",
            summary.thresholds.len()
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::test_data::sample_summary;

    #[test]
    fn text_contains_every_section() {
        let text = render_text(&sample_summary());

        assert!(text.contains("scenario: steady_read"));
        assert!(text.contains("2023-11-14 22:13:20 UTC"));
        assert!(text.contains("240.51s elapsed (240s planned)"));
        assert!(text.contains("http_req_duration{scenario:steady_read}"));
        assert!(text.contains("p(95)<400"));
        assert!(text.contains("batch 200s"));
        assert!(text.contains("100.00%"));
        assert!(text.contains("http_reqs"));
        assert!(text.contains("4 2/s"));
        assert!(text.contains("Result: FAILED (1 of 2 thresholds failed)"));
    }

    #[test]
    fn text_reports_pass_without_thresholds() {
        let mut summary = sample_summary();
        summary.thresholds.clear();
        summary.checks.clear();

        let text = render_text(&summary);
        assert!(text.contains("no thresholds"));
        assert!(text.contains("no checks"));
        assert!(text.contains("Result: PASSED"));
    }
}

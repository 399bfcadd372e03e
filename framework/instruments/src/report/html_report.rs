use super::{format_observed, format_started_at, format_values};
use crosswind_summary_model::{CheckSummary, RunSummary};
use minijinja::{context, Environment};
use serde::Serialize;

/// The `.html` name turns on auto-escaping for every value.
const TEMPLATE_NAME: &str = "summary.html";

const SUMMARY_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Crosswind: {{ scenario_name }}</title>
<style>
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0; color: #1f2933; background: #f5f7fa; }
header { background: #243b53; color: #fff; padding: 1.5rem 2rem; }
header h1 { margin: 0 0 .5rem 0; font-size: 1.5rem; }
header dl { display: grid; grid-template-columns: max-content auto; gap: .2rem 1rem; margin: 0; }
header dt { opacity: .7; }
header dd { margin: 0; }
nav { background: #334e68; padding: .5rem 2rem; }
nav a { color: #d9e2ec; margin-right: 1.2rem; text-decoration: none; }
nav a:hover { text-decoration: underline; }
main { padding: 1rem 2rem 3rem 2rem; }
section { background: #fff; border-radius: 6px; padding: 1rem 1.5rem; margin-top: 1rem; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
table { border-collapse: collapse; width: 100%; font-size: .9rem; }
th, td { text-align: left; padding: .35rem .6rem; border-bottom: 1px solid #e4e7eb; }
th { background: #f0f4f8; }
td.num { font-variant-numeric: tabular-nums; }
tr.sub td:first-child { padding-left: 2rem; color: #52606d; }
.pass { color: #18794e; font-weight: 600; }
.fail { color: #cf1124; font-weight: 600; }
.badge { display: inline-block; padding: .2rem .7rem; border-radius: 1rem; font-weight: 600; }
.badge.pass { background: #e3f9e5; }
.badge.fail { background: #ffe3e3; }
</style>
</head>
<body>
{%- macro check_table(checks) %}
{%- if checks %}
<table>
<tr><th></th><th>Check</th><th>Passes</th><th>Fails</th><th>Rate</th></tr>
{%- for check in checks %}
<tr><td class="{{ 'pass' if check.passed else 'fail' }}">{% if check.passed %}&#10003;{% else %}&#10007;{% endif %}</td><td>{{ check.name }}</td><td class="num">{{ check.passes }}</td><td class="num">{{ check.fails }}</td><td class="num">{{ check.rate }}</td></tr>
{%- endfor %}
</table>
{%- else %}
<p>No checks were recorded.</p>
{%- endif %}
{%- endmacro %}
{%- macro metric_table(rows) %}
<table>
<tr><th>Metric</th><th>Type</th><th>Values</th></tr>
{%- for row in rows %}
<tr{% if row.sub %} class="sub"{% endif %}><td>{{ row.label }}</td><td>{{ row.kind }}</td><td class="num">{{ row.values }}</td></tr>
{%- endfor %}
</table>
{%- endmacro %}
<header>
<h1>{{ scenario_name }} <span class="badge {{ 'pass' if passed else 'fail' }}">{{ 'PASSED' if passed else 'FAILED' }}</span></h1>
<dl>
{%- for term, value in details %}
<dt>{{ term }}</dt><dd>{{ value }}</dd>
{%- endfor %}
</dl>
</header>
<nav>
<a href="#thresholds">Thresholds</a>
<a href="#checks">Checks</a>
<a href="#metrics">Metrics</a>
{%- for scenario in scenarios %}
<a href="#{{ scenario.anchor }}">scenario: {{ scenario.name }}</a>
{%- endfor %}
</nav>
<main>
<section id="thresholds">
<h2>Thresholds</h2>
{%- if thresholds %}
<table>
<tr><th></th><th>Metric</th><th>Condition</th><th>Observed</th><th>Note</th></tr>
{%- for t in thresholds %}
<tr><td class="{{ 'pass' if t.passed else 'fail' }}">{% if t.passed %}&#10003;{% else %}&#10007;{% endif %}</td><td>{{ t.metric }}</td><td>{{ t.condition }}</td><td class="num">{{ t.observed }}</td><td>{{ t.note }}</td></tr>
{%- endfor %}
</table>
{%- else %}
<p>No thresholds were configured.</p>
{%- endif %}
</section>
<section id="checks">
<h2>Checks</h2>
{{- check_table(checks) }}
</section>
<section id="metrics">
<h2>Metrics</h2>
{{- metric_table(metrics) }}
</section>
{%- for scenario in scenarios %}
<section id="{{ scenario.anchor }}">
<h2>scenario: {{ scenario.name }}</h2>
<h3>Checks</h3>
{{- check_table(scenario.checks) }}
<h3>Metrics</h3>
{{- metric_table(scenario.metrics) }}
</section>
{%- endfor %}
</main>
</body>
</html>
"##;

#[derive(Serialize)]
struct ThresholdRow<'a> {
    passed: bool,
    metric: &'a str,
    condition: &'a str,
    observed: String,
    note: &'a str,
}

#[derive(Serialize)]
struct CheckRow<'a> {
    passed: bool,
    name: &'a str,
    passes: u64,
    fails: u64,
    rate: String,
}

impl<'a> CheckRow<'a> {
    fn new(check: &'a CheckSummary) -> Self {
        Self {
            passed: check.fails == 0,
            name: &check.name,
            passes: check.passes,
            fails: check.fails,
            rate: format!("{:.2}%", check.rate() * 100.0),
        }
    }
}

#[derive(Serialize)]
struct MetricRow {
    label: String,
    kind: String,
    values: String,
    sub: bool,
}

#[derive(Serialize)]
struct ScenarioSection<'a> {
    name: String,
    anchor: String,
    checks: Vec<CheckRow<'a>>,
    metrics: Vec<MetricRow>,
}

/// Render a run summary as a single HTML page with no external resources.
pub fn render_html(summary: &RunSummary) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(TEMPLATE_NAME, SUMMARY_TEMPLATE)?;
    let template = env.get_template(TEMPLATE_NAME)?;

    let mut duration = format!("{:.2}s elapsed", summary.elapsed_ms as f64 / 1000.0);
    if let Some(planned) = summary.run_duration {
        duration.push_str(&format!(" ({planned}s planned)"));
    }
    let details = vec![
        ("Run id", summary.run_id.clone()),
        ("Started", format_started_at(summary.started_at)),
        ("Executor", summary.executor.clone()),
        ("Duration", duration),
        ("Peak VUs", summary.peak_vus.to_string()),
        ("Version", summary.crosswind_version.clone()),
    ];

    let thresholds = summary
        .thresholds
        .iter()
        .map(|t| ThresholdRow {
            passed: t.passed,
            metric: &t.metric,
            condition: &t.condition,
            observed: format_observed(&t.observed),
            note: t.note.as_deref().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    let metrics = summary
        .metrics
        .iter()
        .flat_map(|m| {
            std::iter::once(MetricRow {
                label: m.name.clone(),
                kind: m.kind.to_string(),
                values: format_values(&m.name, &m.values),
                sub: false,
            })
            .chain(m.submetrics.iter().map(|sub| MetricRow {
                label: sub.label(&m.name),
                kind: String::new(),
                values: format_values(&m.name, &sub.values),
                sub: true,
            }))
        })
        .collect::<Vec<_>>();

    let scenarios = summary
        .scenario_tags()
        .into_iter()
        .map(|scenario| scenario_section(summary, scenario))
        .collect::<Vec<_>>();

    template.render(context! {
        scenario_name => summary.scenario_name,
        passed => summary.thresholds_passed(),
        details => details,
        thresholds => thresholds,
        checks => summary.checks.iter().map(CheckRow::new).collect::<Vec<_>>(),
        metrics => metrics,
        scenarios => scenarios,
    })
}

fn scenario_section<'a>(summary: &'a RunSummary, scenario: String) -> ScenarioSection<'a> {
    let checks = summary
        .checks
        .iter()
        .filter(|c| c.scenario.as_ref() == Some(&scenario))
        .map(CheckRow::new)
        .collect();
    let metrics = summary
        .metrics
        .iter()
        .flat_map(|m| {
            m.submetrics
                .iter()
                .filter(|sub| sub.tags.get("scenario") == Some(&scenario))
                .map(|sub| MetricRow {
                    label: sub.label(&m.name),
                    kind: m.kind.to_string(),
                    values: format_values(&m.name, &sub.values),
                    sub: false,
                })
        })
        .collect();

    ScenarioSection {
        anchor: scenario_anchor(&scenario),
        name: scenario,
        checks,
        metrics,
    }
}

fn scenario_anchor(scenario: &str) -> String {
    let slug = scenario
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>();
    format!("scenario-{slug}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::test_data::sample_summary;

    fn html() -> String {
        render_html(&sample_summary()).unwrap()
    }

    #[test]
    fn html_is_self_contained() {
        let html = html();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<style>"));
        assert!(!html.contains("<script"));
        assert!(!html.contains("<link"));
        assert!(!html.contains("src="));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn html_links_each_scenario() {
        let html = html();

        assert!(html.contains("<a href=\"#scenario-steady_read\">scenario: steady_read</a>"));
        assert!(html.contains("<section id=\"scenario-steady_read\">"));
        assert!(html.contains("http_req_duration{scenario:steady_read}"));
    }

    #[test]
    fn html_escapes_labels() {
        let html = html();

        assert!(html.contains("patient &lt;200|404&gt;"));
        assert!(!html.contains("patient <200|404>"));
    }

    #[test]
    fn html_escapes_scenario_names() {
        let mut summary = sample_summary();
        summary.scenario_name = "<b>\"loud\"</b>".to_string();

        let html = render_html(&summary).unwrap();

        assert!(!html.contains("<b>"));
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn html_marks_failed_run() {
        let html = html();
        assert!(html.contains("<span class=\"badge fail\">FAILED</span>"));
        assert!(html.contains("rate&gt;0.95"));
        assert!(html.contains("<td class=\"fail\">&#10007;</td>"));
    }

    #[test]
    fn html_lists_run_details() {
        let html = html();
        assert!(html.contains("<dt>Run id</dt><dd>aBcD1234</dd>"));
        assert!(html.contains("<dt>Peak VUs</dt><dd>50</dd>"));
    }

    #[test]
    fn anchors_are_sanitised() {
        assert_eq!("scenario-a-b_c", scenario_anchor("a b_c"));
    }
}

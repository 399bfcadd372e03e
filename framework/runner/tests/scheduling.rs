use std::time::{Duration, Instant};

use crosswind_runner::prelude::{
    run, AgentContext, CrosswindScenarioCli, HookResult, RampingArrivalRate, RampingVus,
    RunSummary, ScenarioDefinitionBuilder, UserValuesConstraint,
};
use crosswind_summary_model::{load_summary_runs, MetricValues};

#[derive(Default, Debug)]
struct Values;

impl UserValuesConstraint for Values {}

type Ctx = AgentContext<Values, Values>;

fn cli(out_dir: &tempfile::TempDir) -> CrosswindScenarioCli {
    CrosswindScenarioCli {
        out_dir: out_dir.path().to_path_buf(),
        no_progress: true,
        ..Default::default()
    }
}

fn counter(summary: &RunSummary, name: &str) -> f64 {
    match summary.metric(name).map(|m| &m.values) {
        Some(MetricValues::Counter { count, .. }) => *count,
        _ => 0.0,
    }
}

fn quick_behaviour(ctx: &mut Ctx) -> HookResult {
    ctx.check("always", true);
    ctx.metrics().add_trend("work", 5.0);
    ctx.sleep(Duration::from_millis(10))
}

#[test]
fn iteration_cap_ends_the_run_early() {
    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("capped", cli(&out_dir))
        .with_constant_vus(1, Duration::from_secs(60))
        .with_iterations(3)
        .use_agent_behaviour(quick_behaviour);

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(3.0, counter(&summary, "iterations"));
    assert_eq!(1, summary.peak_vus);
}

#[test]
fn thresholds_are_judged_and_summaries_written() {
    let out_dir = tempfile::tempdir().unwrap();
    let mut cli = cli(&out_dir);
    cli.run_id = Some("test-run".to_string());
    cli.run_summary_path = Some(out_dir.path().join("runs.jsonl"));

    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("judged", cli)
        .with_constant_vus(1, Duration::from_secs(60))
        .with_iterations(2)
        .with_threshold("checks", "rate>0.99")
        .with_threshold("work{scenario:judged}", "max<1")
        .with_threshold("never_recorded", "count>0")
        .use_agent_behaviour(quick_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!("test-run", summary.run_id);
    assert!(!summary.thresholds_passed());
    assert!(summary.threshold("checks", "rate>0.99").unwrap().passed);
    let failed = summary.threshold("work{scenario:judged}", "max<1").unwrap();
    assert!(!failed.passed);
    assert_eq!(Some(5.0), failed.observed);
    let no_data = summary.threshold("never_recorded", "count>0").unwrap();
    assert!(no_data.passed);
    assert_eq!(None, no_data.observed);

    let text = std::fs::read_to_string(out_dir.path().join("summary.txt")).unwrap();
    assert!(text.contains("Result: FAILED (1 of 3 thresholds failed)"));
    let html = std::fs::read_to_string(out_dir.path().join("summary.html")).unwrap();
    assert!(html.contains("id=\"scenario-judged\""));

    let runs = load_summary_runs(&out_dir.path().join("runs.jsonl")).unwrap();
    assert_eq!(1, runs.len());
    assert_eq!(summary.run_id, runs[0].run_id);
    assert_eq!(summary.fingerprint(), runs[0].fingerprint());
}

#[test]
fn saturated_arrival_rate_drops_iterations() {
    fn slow_behaviour(ctx: &mut Ctx) -> HookResult {
        ctx.sleep(Duration::from_millis(200))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("saturated", cli(&out_dir))
        .with_ramping_arrival_rate(
            RampingArrivalRate::new(20)
                .pre_allocated_vus(1)
                .max_vus(1)
                .stage(Duration::from_secs(1), 20),
        )
        .use_agent_behaviour(slow_behaviour);

    let summary = run(scenario).unwrap();

    let iterations = counter(&summary, "iterations");
    let dropped = counter(&summary, "dropped_iterations");
    assert!(dropped > 0.0, "nothing dropped");
    assert_eq!(20.0, iterations + dropped);
    assert_eq!(1, summary.peak_vus);
}

#[test]
fn arrival_rate_grows_pool_on_demand() {
    fn slow_behaviour(ctx: &mut Ctx) -> HookResult {
        ctx.sleep(Duration::from_millis(200))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("growing", cli(&out_dir))
        .with_ramping_arrival_rate(
            RampingArrivalRate::new(20)
                .pre_allocated_vus(1)
                .max_vus(50)
                .stage(Duration::from_secs(1), 20),
        )
        .use_agent_behaviour(slow_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!(20.0, counter(&summary, "iterations"));
    assert_eq!(0.0, counter(&summary, "dropped_iterations"));
    assert!(summary.peak_vus > 1);
}

#[test]
fn retired_vus_are_interrupted_after_ramp_down_grace() {
    fn stuck_behaviour(ctx: &mut Ctx) -> HookResult {
        ctx.sleep(Duration::from_secs(600))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("stuck", cli(&out_dir))
        .with_ramping_vus(
            RampingVus::new(1)
                .stage(Duration::from_millis(300), 1)
                .stage(Duration::ZERO, 0)
                .stage(Duration::from_secs(2), 0)
                .graceful_ramp_down(Duration::from_millis(200)),
        )
        .with_graceful_stop(Duration::from_millis(200))
        .use_agent_behaviour(stuck_behaviour);

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(1.0, counter(&summary, "iterations_interrupted"));
    assert_eq!(0.0, counter(&summary, "iterations"));
}

#[test]
fn configuration_errors_stop_before_any_iteration() {
    let out_dir = tempfile::tempdir().unwrap();

    let mut bad_url = cli(&out_dir);
    bad_url.base_url = "not a url".to_string();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("bad_url", bad_url)
        .with_constant_vus(1, Duration::from_secs(1))
        .use_agent_behaviour(quick_behaviour);
    assert!(run(scenario).is_err());

    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("bad_pool", cli(&out_dir))
        .with_ramping_arrival_rate(
            RampingArrivalRate::new(10)
                .pre_allocated_vus(50)
                .max_vus(10)
                .stage(Duration::from_secs(1), 10),
        )
        .use_agent_behaviour(quick_behaviour);
    assert!(run(scenario).is_err());

    assert!(!out_dir.path().join("summary.txt").exists());
}

fn gauge(summary: &RunSummary, name: &str) -> f64 {
    match summary.metric(name).map(|m| &m.values) {
        Some(MetricValues::Gauge { value, .. }) => *value,
        _ => 0.0,
    }
}

#[test]
fn ramping_vus_converge_on_the_target() {
    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("converge", cli(&out_dir))
        .with_ramping_vus(
            RampingVus::new(0)
                .stage(Duration::from_millis(400), 4)
                .stage(Duration::from_millis(600), 4)
                .stage(Duration::ZERO, 0)
                .stage(Duration::from_millis(300), 0),
        )
        .use_agent_behaviour(quick_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!(4, summary.peak_vus);
    assert!(counter(&summary, "iterations") > 0.0);
    // The pool size is kept after the ramp down.
    assert_eq!(4.0, gauge(&summary, "vus_max"));
    assert_eq!(0.0, gauge(&summary, "vus"));
}

#[test]
fn arrivals_for_vus_that_fail_setup_are_dropped() {
    fn failing_setup(_ctx: &mut Ctx) -> HookResult {
        Err(anyhow::anyhow!("no credentials"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<Values, Values>::new("no_setup", cli(&out_dir))
        .with_ramping_arrival_rate(
            RampingArrivalRate::new(10)
                .pre_allocated_vus(0)
                .max_vus(5)
                .stage(Duration::from_secs(1), 10),
        )
        .use_agent_setup(failing_setup)
        .use_agent_behaviour(quick_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!(0.0, counter(&summary, "iterations"));
    assert_eq!(10.0, counter(&summary, "dropped_iterations"));
}

use std::sync::Arc;
use std::time::Duration;

use crosswind_runner::prelude::{
    run, AgentContext, CrosswindScenarioCli, HookResult, RunSummary, RunnerContext,
    ScenarioDefinitionBuilder, UserValuesConstraint, VuBailError,
};
use crosswind_summary_model::MetricValues;

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct AgentContextValue {
    value: i32,
}

impl UserValuesConstraint for AgentContextValue {}

type Ctx = AgentContext<RunnerContextValue, AgentContextValue>;

fn sample_cli_cfg(out_dir: &tempfile::TempDir) -> CrosswindScenarioCli {
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

fn idle_behaviour(ctx: &mut Ctx) -> HookResult {
    ctx.sleep(Duration::from_millis(10))
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "propagate_error_in_setup_hook",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(5))
    .use_setup(setup)
    .use_agent_behaviour(idle_behaviour);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn capture_error_in_agent_setup() {
    fn agent_setup(_ctx: &mut Ctx) -> HookResult {
        Err(anyhow::anyhow!("Error in agent setup hook"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_setup",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(1))
    .use_agent_setup(agent_setup)
    .use_agent_behaviour(idle_behaviour);

    let summary = run(scenario).unwrap();

    // The VU never got as far as its first iteration.
    assert_eq!(0.0, counter(&summary, "iterations"));
}

#[test]
fn capture_error_in_agent_behaviour_and_continue() {
    fn agent_behaviour(ctx: &mut Ctx) -> HookResult {
        if ctx.get().value < 5 {
            ctx.get_mut().value += 1;
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }

        Err(anyhow::anyhow!("Error in agent behaviour hook"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_behaviour_and_continue",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(5))
    .use_agent_behaviour(agent_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!(6.0, counter(&summary, "iterations"));
    assert_eq!(6.0, counter(&summary, "iterations_failed"));
}

#[test]
fn capture_panic_in_agent_behaviour_and_continue() {
    fn agent_behaviour(ctx: &mut Ctx) -> HookResult {
        ctx.get_mut().value += 1;
        if ctx.get().value >= 3 {
            ctx.runner_context().force_stop_scenario();
            return Ok(());
        }
        panic!("Panic in agent behaviour hook");
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_panic_in_agent_behaviour_and_continue",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(5))
    .use_agent_behaviour(agent_behaviour);

    let summary = run(scenario).unwrap();

    assert_eq!(3.0, counter(&summary, "iterations"));
    assert_eq!(2.0, counter(&summary, "iterations_failed"));
}

#[test]
fn bail_error_stops_agent_behaviour() {
    fn agent_behaviour(ctx: &mut Ctx) -> HookResult {
        if ctx.agent_index() == 0 {
            return Err(VuBailError::default().into());
        }
        ctx.sleep(Duration::from_millis(10))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "bail_error_stops_agent_behaviour",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(2, Duration::from_secs(1))
    .use_agent_behaviour(agent_behaviour);

    let summary = run(scenario).unwrap();

    // Only the bailing VU's single iteration failed, the other VU kept going.
    assert_eq!(1.0, counter(&summary, "iterations_failed"));
    assert!(counter(&summary, "iterations") > 2.0);
}

#[test]
fn capture_error_in_agent_teardown() {
    fn agent_teardown(_ctx: &mut Ctx) -> HookResult {
        Err(anyhow::anyhow!("Error in agent teardown hook"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_agent_teardown",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(1))
    .use_agent_behaviour(idle_behaviour)
    .use_agent_teardown(agent_teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let out_dir = tempfile::tempdir().unwrap();
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, AgentContextValue>::new(
        "capture_error_in_teardown",
        sample_cli_cfg(&out_dir),
    )
    .with_constant_vus(1, Duration::from_secs(1))
    .use_agent_behaviour(idle_behaviour)
    .use_teardown(teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

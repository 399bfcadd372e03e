use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use crosswind_core::prelude::ShutdownHandle;
use crosswind_instruments::{evaluate, report, MetricsRegistry, Tags};
use crosswind_summary_model::{append_run_summary, RunSummary};

use crate::config::RunConfig;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::{run_schedule, IterationBudget, VuFactory};
use crate::{
    context::{RunnerContext, UserValuesConstraint},
    definition::ScenarioDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// The exit code for a scenario binary when all thresholds pass.
pub const EXIT_THRESHOLDS_PASSED: u8 = 0;
/// The exit code for a scenario binary when any threshold fails.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;

/// Run a scenario to completion and write its summary.
///
/// Failing thresholds do not make this return an error, check [RunSummary::thresholds_passed] or
/// use [exit_code]. Errors are reserved for invalid configuration, a failing setup hook and
/// problems with the runner itself.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunSummary> {
    let definition = definition.build()?;
    let config = Arc::new(RunConfig::from_cli(&definition.cli)?);
    std::fs::create_dir_all(config.out_dir()).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.out_dir().display()
        )
    })?;

    log::info!("Running scenario: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let stop_handle = ShutdownHandle::new();
    let abort_handle = ShutdownHandle::new();
    start_shutdown_listener(&runtime, stop_handle.clone(), abort_handle.clone());
    let executor = Arc::new(Executor::new(runtime, abort_handle));
    let registry = Arc::new(MetricsRegistry::new());

    let mut runner_context = RunnerContext::new(
        executor,
        registry.clone(),
        stop_handle.clone(),
        config.clone(),
        &definition.name,
    );

    let started_at = chrono::Utc::now().timestamp();
    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }
    let runner_context = Arc::new(runner_context);

    let planned = definition.schedule.planned_duration();
    let progress = if config.no_progress() {
        None
    } else {
        Some(start_progress(planned, stop_handle.new_listener())?)
    };
    // Ready to start spawning VUs so start the resource monitor to report high usage by the
    // harness itself, which would make the results misleading.
    let monitor = start_monitor(stop_handle.new_listener())?;

    let factory = VuFactory {
        runner_context: runner_context.clone(),
        setup_agent_fn: definition.setup_agent_fn,
        behaviour: definition.agent_behaviour,
        teardown_agent_fn: definition.teardown_agent_fn,
        budget: Arc::new(IterationBudget::new(definition.iterations)),
        run_stop: stop_handle.clone(),
    };

    let started = Instant::now();
    let scheduled = run_schedule(&definition.schedule, &factory, definition.graceful_stop);
    let elapsed = started.elapsed();
    drop(factory);

    // Everything watching the run can stop now.
    stop_handle.shutdown();
    if let Some(progress) = progress {
        let _ = progress.join();
    }
    let _ = monitor.join();

    let peak_vus = scheduled?;

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    let snapshot = registry.snapshot_with_elapsed(elapsed);
    let verdicts = evaluate(&definition.thresholds, &snapshot);
    let filters = definition
        .thresholds
        .iter()
        .filter(|t| !t.filter().is_empty())
        .map(|t| (t.metric().to_string(), t.filter().clone()))
        .collect::<Vec<(String, Tags)>>();

    let run_id = config
        .run_id()
        .map(ToString::to_string)
        .unwrap_or_else(|| nanoid::nanoid!());
    let summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        started_at,
        Some(planned.as_secs()),
        definition.schedule.description(),
        env!("CARGO_PKG_VERSION").to_string(),
    )
    .with_env("BASE_URL", config.base_url())
    .with_results(
        elapsed.as_millis() as u64,
        peak_vus,
        snapshot.summarize(&filters),
        snapshot.checks(),
        verdicts,
    );

    write_summary(&summary, config.out_dir())?;
    if let Some(path) = config.run_summary_path() {
        append_run_summary(&summary, path)
            .with_context(|| format!("Failed to append run summary to {}", path.display()))?;
    }

    for failed in summary.failed_thresholds() {
        log::warn!(
            "Threshold failed: {} {} (observed {:?})",
            failed.metric,
            failed.condition,
            failed.observed
        );
    }
    log::info!(
        "Scenario {} finished, thresholds {}",
        summary.scenario_name,
        if summary.thresholds_passed() {
            "passed"
        } else {
            "failed"
        }
    );

    Ok(summary)
}

/// Write `summary.txt` and `summary.html` to `out_dir` and print the text summary.
fn write_summary(summary: &RunSummary, out_dir: &Path) -> anyhow::Result<()> {
    let rendered = report::render(summary).context("Failed to render the run summary")?;

    let text_path = out_dir.join("summary.txt");
    std::fs::write(&text_path, &rendered.text)
        .with_context(|| format!("Failed to write {}", text_path.display()))?;
    let html_path = out_dir.join("summary.html");
    std::fs::write(&html_path, &rendered.html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;

    println!("{}", rendered.text);
    log::info!(
        "Wrote {} and {}",
        text_path.display(),
        html_path.display()
    );
    Ok(())
}

/// The process exit code for a finished run.
pub fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.thresholds_passed() {
        ExitCode::from(EXIT_THRESHOLDS_PASSED)
    } else {
        ExitCode::from(EXIT_THRESHOLDS_FAILED)
    }
}

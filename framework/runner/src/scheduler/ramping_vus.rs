use std::time::{Duration, Instant};

use crosswind_instruments::names;

use super::schedule::RampingVus;
use super::vu::{reap_retiring, stop_all, IterationSource, VuFactory, VuHandle};
use super::TICK;
use crate::context::UserValuesConstraint;

/// Keep the number of looping VUs at the interpolated target until the stages run out or the run
/// is stopped. Returns the peak number of VUs.
pub(crate) fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: &RampingVus,
    factory: &VuFactory<RV, V>,
    graceful_stop: Duration,
) -> anyhow::Result<usize> {
    let schedule = config.schedule();
    let total = schedule.total_duration();
    let stop_listener = factory.run_stop.new_listener();
    let metrics = factory.runner_context.metrics();

    let mut active: Vec<VuHandle> = Vec::new();
    let mut retiring: Vec<(VuHandle, Instant)> = Vec::new();
    let mut next_index = 0;
    let mut peak = 0;
    // VUs that ever ran at the same time, retiring ones included.
    let mut allocated = 0;
    let mut failure = None;

    let started = Instant::now();
    loop {
        let elapsed = started.elapsed();
        if elapsed >= total || stop_listener.should_shutdown() {
            break;
        }

        let target = schedule.value_at(elapsed).round().max(0.0) as usize;
        while active.len() < target {
            match factory.spawn(next_index, IterationSource::Loop) {
                Ok(vu) => {
                    active.push(vu);
                    next_index += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if failure.is_some() {
            break;
        }

        // Newest first, so that long lived VUs keep their warm connections.
        while active.len() > target {
            if let Some(vu) = active.pop() {
                vu.retire();
                retiring.push((vu, Instant::now() + config.graceful_ramp_down));
            }
        }
        reap_retiring(&mut retiring);

        let running = active.iter().filter(|vu| !vu.is_finished()).count() + retiring.len();
        allocated = allocated.max(active.len() + retiring.len());
        peak = peak.max(running);
        metrics.set_gauge(names::VUS, running as f64);
        metrics.set_gauge(names::VUS_MAX, allocated as f64);

        std::thread::sleep(TICK.min(total.saturating_sub(elapsed)));
    }

    log::info!(
        "Ramping VUs finished after {:.1}s, stopping {} VUs",
        started.elapsed().as_secs_f64(),
        active.len() + retiring.len()
    );
    let vus = active
        .into_iter()
        .chain(retiring.into_iter().map(|(vu, _)| vu))
        .collect();
    stop_all(vus, graceful_stop);
    metrics.set_gauge(names::VUS, 0.0);

    match failure {
        Some(e) => Err(e),
        None => Ok(peak),
    }
}

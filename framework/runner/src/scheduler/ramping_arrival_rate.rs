use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TrySendError};
use crosswind_instruments::names;

use super::schedule::RampingArrivalRate;
use super::vu::{stop_all, IterationSource, VuFactory, VuHandle};
use super::TICK;
use crate::context::UserValuesConstraint;

/// Start iterations at the interpolated arrival rate until the stages run out or the run is
/// stopped. Returns the peak number of VUs.
///
/// Arrivals go out on a rendezvous channel, so a send only succeeds when a worker is waiting for
/// one. Otherwise the arrival goes to a new worker while the pool is below `max_vus`, and is
/// dropped when it is not. The schedule never waits for a worker.
pub(crate) fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    config: &RampingArrivalRate,
    factory: &VuFactory<RV, V>,
    graceful_stop: Duration,
) -> anyhow::Result<usize> {
    let schedule = config.schedule();
    let max_vus = config.effective_max_vus() as usize;
    let stop_listener = factory.run_stop.new_listener();
    let metrics = factory.runner_context.metrics();
    let (arrivals, receiver) = crossbeam_channel::bounded::<u64>(0);
    let idle = Arc::new(AtomicUsize::new(0));

    let mut workers: Vec<VuHandle> = Vec::new();
    let mut failure = None;
    for index in 0..config.pre_allocated_vus as usize {
        match spawn_worker(factory, index, &receiver, &idle, None) {
            Ok(vu) => workers.push(vu),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Pre-allocated workers finish their set up before the clock starts.
    while failure.is_none() && !stop_listener.should_shutdown() {
        let finished = workers.iter().filter(|vu| vu.is_finished()).count();
        if idle.load(Ordering::Acquire) + finished >= workers.len() {
            break;
        }
        std::thread::sleep(TICK / 10);
    }
    log::info!(
        "{} VUs pre-allocated, starting arrivals at {}/{:?}",
        workers.len(),
        config.start_rate,
        config.time_unit
    );

    let mut peak = 0;
    let mut dropped = 0u64;
    let mut arrival = 0u64;
    let started = Instant::now();
    'arrivals: while failure.is_none() {
        let Some(due) = schedule.arrival_time(arrival + 1, config.time_unit) else {
            break;
        };

        loop {
            if stop_listener.should_shutdown() {
                break 'arrivals;
            }
            peak = peak.max(record_gauges(factory, &workers, &idle));
            let elapsed = started.elapsed();
            if elapsed >= due {
                break;
            }
            std::thread::sleep((due - elapsed).min(TICK));
        }
        arrival += 1;

        match arrivals.try_send(arrival) {
            Ok(()) => continue,
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }

        let running = workers.iter().filter(|vu| !vu.is_finished()).count();
        if running < max_vus {
            match spawn_worker(factory, workers.len(), &receiver, &idle, Some(arrival)) {
                Ok(vu) => workers.push(vu),
                Err(e) => failure = Some(e),
            }
        } else {
            dropped += 1;
            metrics.add_counter(names::DROPPED_ITERATIONS, 1.0);
            if dropped == 1 || dropped % 100 == 0 {
                log::warn!(
                    "All {max_vus} VUs are busy, {dropped} iterations dropped so far. Consider raising max_vus"
                );
            }
        }
    }

    if dropped > 0 {
        log::warn!("Dropped {dropped} of {arrival} iterations because no VU was free");
    }
    log::info!(
        "Arrivals finished after {:.1}s, stopping {} VUs",
        started.elapsed().as_secs_f64(),
        workers.len()
    );
    peak = peak.max(record_gauges(factory, &workers, &idle));
    drop(arrivals);
    stop_all(workers, graceful_stop);
    metrics.set_gauge(names::VUS, 0.0);

    match failure {
        Some(e) => Err(e),
        None => Ok(peak),
    }
}

fn spawn_worker<RV: UserValuesConstraint, V: UserValuesConstraint>(
    factory: &VuFactory<RV, V>,
    index: usize,
    receiver: &Receiver<u64>,
    idle: &Arc<AtomicUsize>,
    first: Option<u64>,
) -> anyhow::Result<VuHandle> {
    factory.spawn(
        index,
        IterationSource::Arrivals {
            receiver: receiver.clone(),
            idle: idle.clone(),
            first,
        },
    )
}

/// Returns the number of running workers.
fn record_gauges<RV: UserValuesConstraint, V: UserValuesConstraint>(
    factory: &VuFactory<RV, V>,
    workers: &[VuHandle],
    idle: &AtomicUsize,
) -> usize {
    let running = workers.iter().filter(|vu| !vu.is_finished()).count();
    let busy = running.saturating_sub(idle.load(Ordering::Acquire));
    let metrics = factory.runner_context.metrics();
    metrics.set_gauge(names::VUS, busy as f64);
    metrics.set_gauge(names::VUS_MAX, workers.len() as f64);
    running
}

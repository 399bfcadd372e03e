use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use crosswind_core::prelude::ShutdownHandle;
use crosswind_instruments::names;

use super::iteration::{run_iteration, IterationBudget, IterationOutcome};
use super::TICK;
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::definition::AgentHookMut;

/// Where a VU gets permission to start its next iteration from.
pub(crate) enum IterationSource {
    /// Start the next iteration as soon as the last one finishes.
    Loop,
    /// Start an iteration for each arrival taken from the shared channel.
    Arrivals {
        receiver: Receiver<u64>,
        /// Number of workers currently waiting on `receiver`.
        idle: Arc<AtomicUsize>,
        /// The arrival this worker was created for, run before taking from the channel.
        first: Option<u64>,
    },
}

/// The hooks and shared state that every VU of a scenario is created from.
pub(crate) struct VuFactory<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) runner_context: Arc<RunnerContext<RV>>,
    pub(crate) setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) behaviour: AgentHookMut<RV, V>,
    pub(crate) teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) budget: Arc<IterationBudget>,
    pub(crate) run_stop: ShutdownHandle,
}

/// The scheduler's side of a running VU.
pub(crate) struct VuHandle {
    agent_id: String,
    stop: ShutdownHandle,
    interrupt: ShutdownHandle,
    thread: JoinHandle<()>,
}

impl VuHandle {
    /// Ask the VU to finish its current iteration and exit.
    pub(crate) fn retire(&self) {
        self.stop.shutdown();
    }

    /// Cancel the VU's in-flight iteration.
    pub(crate) fn interrupt(&self) {
        self.interrupt.shutdown();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub(crate) fn join(self) {
        if self.thread.join().is_err() {
            log::error!("{} panicked outside of an iteration", self.agent_id);
        }
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuFactory<RV, V> {
    pub(crate) fn spawn(
        &self,
        agent_index: usize,
        source: IterationSource,
    ) -> anyhow::Result<VuHandle> {
        let agent_id = format!("vu-{agent_index}");
        let stop = ShutdownHandle::new();
        let interrupt = ShutdownHandle::new();

        let runner_context = self.runner_context.clone();
        let setup_agent_fn = self.setup_agent_fn;
        let behaviour = self.behaviour;
        let teardown_agent_fn = self.teardown_agent_fn;
        let budget = self.budget.clone();
        let run_stop = self.run_stop.clone();
        let vu_stop_listener = stop.new_listener();
        let run_stop_listener = run_stop.new_listener();
        let interrupt_listener = interrupt.new_listener();

        let thread = std::thread::Builder::new()
            .name(agent_id.clone())
            .spawn(move || {
                let mut context = AgentContext::new(agent_index, runner_context, interrupt_listener);
                log::debug!("Starting {}", context.agent_id());

                if let Some(setup_agent_fn) = setup_agent_fn {
                    if let Err(e) = setup_agent_fn(&mut context) {
                        log::error!("Agent setup failed for {}: {:?}", context.agent_id(), e);
                        if let IterationSource::Arrivals { first: Some(_), .. } = &source {
                            context.metrics().add_counter(names::DROPPED_ITERATIONS, 1.0);
                        }
                        return;
                    }
                }

                let should_stop = || {
                    vu_stop_listener.should_shutdown() || run_stop_listener.should_shutdown()
                };

                match source {
                    IterationSource::Loop => loop {
                        if should_stop() {
                            break;
                        }
                        if !budget.try_start() {
                            run_stop.shutdown();
                            break;
                        }
                        if run_iteration(behaviour, &mut context) == IterationOutcome::Bailed {
                            break;
                        }
                    },
                    IterationSource::Arrivals {
                        receiver,
                        idle,
                        mut first,
                    } => loop {
                        let arrival = match first.take() {
                            Some(arrival) => arrival,
                            None => {
                                idle.fetch_add(1, Ordering::AcqRel);
                                let next = next_arrival(&receiver, &should_stop);
                                idle.fetch_sub(1, Ordering::AcqRel);
                                match next {
                                    Some(arrival) => arrival,
                                    None => break,
                                }
                            }
                        };
                        if !budget.try_start() {
                            run_stop.shutdown();
                            break;
                        }
                        log::trace!("{} took arrival {arrival}", context.agent_id());
                        if run_iteration(behaviour, &mut context) == IterationOutcome::Bailed {
                            break;
                        }
                        if should_stop() {
                            break;
                        }
                    },
                }

                if let Some(teardown_agent_fn) = teardown_agent_fn {
                    if let Err(e) = teardown_agent_fn(&mut context) {
                        log::error!("Agent teardown failed for {}: {:?}", context.agent_id(), e);
                    }
                }
                log::debug!("Stopped {}", context.agent_id());
            })
            .with_context(|| format!("Failed to spawn thread for {agent_id}"))?;

        Ok(VuHandle {
            agent_id,
            stop,
            interrupt,
            thread,
        })
    }
}

/// Wait for the next arrival, giving up when the VU is told to stop or the channel closes.
fn next_arrival(receiver: &Receiver<u64>, should_stop: &impl Fn() -> bool) -> Option<u64> {
    loop {
        match receiver.recv_timeout(TICK) {
            Ok(arrival) => return Some(arrival),
            Err(RecvTimeoutError::Timeout) => {
                if should_stop() {
                    return None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

/// Retire every VU, give them `graceful_stop` to finish their iterations, then interrupt whatever
/// is still running and wait for all of them to exit.
pub(crate) fn stop_all(vus: Vec<VuHandle>, graceful_stop: Duration) {
    for vu in &vus {
        vu.retire();
    }

    let deadline = Instant::now() + graceful_stop;
    loop {
        let running = vus.iter().filter(|vu| !vu.is_finished()).count();
        if running == 0 {
            break;
        }
        if Instant::now() >= deadline {
            log::warn!(
                "{running} VUs still running after the graceful stop period of {graceful_stop:?}, interrupting them"
            );
            for vu in &vus {
                vu.interrupt();
            }
            break;
        }
        std::thread::sleep(TICK);
    }

    for vu in vus {
        vu.join();
    }
}

/// Drive VUs that are being retired: join the ones that are done and interrupt the ones whose
/// grace period is over.
pub(crate) fn reap_retiring(retiring: &mut Vec<(VuHandle, Instant)>) {
    let now = Instant::now();
    let mut still_running = Vec::with_capacity(retiring.len());
    for (vu, deadline) in retiring.drain(..) {
        if vu.is_finished() {
            vu.join();
        } else {
            if now >= deadline {
                vu.interrupt();
            }
            still_running.push((vu, deadline));
        }
    }
    *retiring = still_running;
}

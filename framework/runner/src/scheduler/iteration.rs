use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use crosswind_core::prelude::{ShutdownSignalError, VuBailError};
use crosswind_instruments::{names, report_operation, OperationRecord, Tags};

use crate::context::{AgentContext, UserValuesConstraint};
use crate::definition::AgentHookMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterationOutcome {
    Completed,
    Failed,
    Interrupted,
    /// The VU asked to be retired.
    Bailed,
}

/// Run one iteration of `behaviour`, recording its outcome.
///
/// Errors and panics are contained here so that one bad iteration never takes down its VU, let
/// alone the run.
pub(crate) fn run_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    behaviour: AgentHookMut<RV, V>,
    context: &mut AgentContext<RV, V>,
) -> IterationOutcome {
    context.start_iteration();
    let record = OperationRecord::new(names::ITERATION_DURATION);

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| behaviour(context))) {
        Ok(Ok(())) => IterationOutcome::Completed,
        Ok(Err(e)) if e.is::<ShutdownSignalError>() => {
            log::debug!(
                "Iteration {} on {} was interrupted",
                context.iteration(),
                context.agent_id()
            );
            IterationOutcome::Interrupted
        }
        Ok(Err(e)) if e.is::<VuBailError>() => {
            log::warn!("{} is bailing: {e}", context.agent_id());
            IterationOutcome::Bailed
        }
        Ok(Err(e)) => {
            log::error!(
                "Iteration {} on {} failed: {e:?}",
                context.iteration(),
                context.agent_id()
            );
            IterationOutcome::Failed
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!(
                "Iteration {} on {} panicked: {message}",
                context.iteration(),
                context.agent_id()
            );
            IterationOutcome::Failed
        }
    };

    let metrics = context.metrics();
    if outcome == IterationOutcome::Interrupted {
        metrics.add_counter(names::ITERATIONS_INTERRUPTED, 1.0);
    } else {
        report_operation(record, metrics, Tags::new());
        metrics.add_counter(names::ITERATIONS, 1.0);
        if outcome != IterationOutcome::Completed {
            metrics.add_counter(names::ITERATIONS_FAILED, 1.0);
        }
    }

    outcome
}

/// Caps the number of iterations a scenario starts, across all of its VUs.
#[derive(Debug)]
pub(crate) struct IterationBudget {
    limit: Option<u64>,
    started: AtomicU64,
}

impl IterationBudget {
    pub(crate) fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            started: AtomicU64::new(0),
        }
    }

    /// Claim the right to start one more iteration.
    pub(crate) fn try_start(&self) -> bool {
        match self.limit {
            None => {
                self.started.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(limit) => self
                .started
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |started| {
                    (started < limit).then_some(started + 1)
                })
                .is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_always_starts() {
        let budget = IterationBudget::new(None);
        for _ in 0..1000 {
            assert!(budget.try_start());
        }
    }

    #[test]
    fn limited_budget_is_shared_across_threads() {
        let budget = std::sync::Arc::new(IterationBudget::new(Some(100)));

        let handles = (0..8)
            .map(|_| {
                let budget = budget.clone();
                std::thread::spawn(move || (0..50).filter(|_| budget.try_start()).count())
            })
            .collect::<Vec<_>>();
        let started: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(100, started);
        assert!(!budget.try_start());
    }
}

mod iteration;
mod ramping_arrival_rate;
mod ramping_vus;
mod schedule;
mod vu;

use std::time::Duration;

pub use schedule::{RampingArrivalRate, RampingVus, ScheduleError, ScheduleKind, Stage};

pub(crate) use iteration::IterationBudget;
pub(crate) use vu::VuFactory;

use crate::context::UserValuesConstraint;

/// How often controllers re-evaluate their targets and idle VUs check whether they should stop.
pub(crate) const TICK: Duration = Duration::from_millis(100);

/// Run the scenario's schedule to completion, including the graceful stop of every VU. Returns the
/// peak number of VUs that were running at once.
pub(crate) fn run_schedule<RV: UserValuesConstraint, V: UserValuesConstraint>(
    schedule: &ScheduleKind,
    factory: &VuFactory<RV, V>,
    graceful_stop: Duration,
) -> anyhow::Result<usize> {
    match schedule {
        ScheduleKind::RampingVus(config) => ramping_vus::run(config, factory, graceful_stop),
        ScheduleKind::RampingArrivalRate(config) => {
            ramping_arrival_rate::run(config, factory, graceful_stop)
        }
    }
}

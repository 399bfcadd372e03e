mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::CrosswindScenarioCli;
    pub use crate::config::{ConfigError, RunConfig};
    pub use crate::context::UserValuesConstraint;
    pub use crate::context::{AgentContext, RunnerContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::{exit_code, run, EXIT_THRESHOLDS_FAILED, EXIT_THRESHOLDS_PASSED};
    pub use crate::scheduler::{RampingArrivalRate, RampingVus, ScheduleError, Stage};
    pub use crate::types::CrosswindResult;

    pub use crosswind_core::prelude::{ShutdownSignalError, VuBailError};
    pub use crosswind_instruments::MetricsScope;
    pub use crosswind_summary_model::RunSummary;
}

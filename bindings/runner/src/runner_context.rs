use crosswind_runner::prelude::UserValuesConstraint;

/// Shared values for HTTP scenarios. The target and credentials live in the run configuration, so
/// there is nothing to share yet beyond what [crosswind_runner::prelude::RunnerContext] carries.
#[derive(Default, Debug)]
pub struct HttpRunnerContext {}

impl UserValuesConstraint for HttpRunnerContext {}

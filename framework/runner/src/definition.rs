use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use crosswind_instruments::Threshold;

use crate::cli::CrosswindScenarioCli;
use crate::context::{AgentContext, RunnerContext, UserValuesConstraint};
use crate::scheduler::{RampingArrivalRate, RampingVus, ScheduleError, ScheduleKind};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type AgentHookMut<RV, V> = fn(&mut AgentContext<RV, V>) -> HookResult;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario. It is also the value of the `scenario` tag on every sample that
    /// the scenario records.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: CrosswindScenarioCli,
    schedule: Option<ScheduleKind>,
    /// Stop after this many iterations have started. The `--iterations` flag overrides this.
    iterations: Option<u64>,
    /// How long in-flight iterations may take to finish once the scenario is stopping.
    graceful_stop: Duration,
    /// Thresholds as `(metric expression, condition)`, parsed by [ScenarioDefinitionBuilder::build].
    thresholds: Vec<(String, String)>,
    /// Global setup hook for this scenario. It will be run once, before any VUs are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a VU, which will be run once for each VU as it starts.
    setup_agent_fn: Option<AgentHookMut<RV, V>>,
    /// The behaviour for this scenario, one call is one iteration.
    agent_behaviour: Option<AgentHookMut<RV, V>>,
    /// Teardown hook for a VU, which will be run once for each VU as it is retired.
    teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    /// Global teardown hook for this scenario. It is run once, after every VU has stopped. It is
    /// best effort, a failure is logged but does not fail the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) cli: CrosswindScenarioCli,
    pub(crate) schedule: ScheduleKind,
    pub(crate) iterations: Option<u64>,
    pub(crate) graceful_stop: Duration,
    pub(crate) thresholds: Vec<Threshold>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) setup_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) agent_behaviour: AgentHookMut<RV, V>,
    pub(crate) teardown_agent_fn: Option<AgentHookMut<RV, V>>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    pub fn new(name: &str, cli: CrosswindScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            schedule: None,
            iterations: None,
            graceful_stop: Duration::from_secs(30),
            thresholds: Vec::new(),
            setup_fn: None,
            setup_agent_fn: None,
            agent_behaviour: None,
            teardown_agent_fn: None,
            teardown_fn: None,
        }
    }

    /// Initialise logging and parse the command line, then create the builder.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_ramping_vus(mut self, ramping_vus: RampingVus) -> Self {
        self.schedule = Some(ScheduleKind::RampingVus(ramping_vus));
        self
    }

    /// A fixed number of VUs for a fixed duration.
    pub fn with_constant_vus(self, vus: u64, duration: Duration) -> Self {
        self.with_ramping_vus(RampingVus::new(vus).stage(duration, vus))
    }

    pub fn with_ramping_arrival_rate(mut self, arrival_rate: RampingArrivalRate) -> Self {
        self.schedule = Some(ScheduleKind::RampingArrivalRate(arrival_rate));
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Add a threshold, for example `with_threshold("http_req_duration{scenario:spike}", "p(95)<1000")`.
    pub fn with_threshold(mut self, metric: &str, condition: &str) -> Self {
        self.thresholds
            .push((metric.to_string(), condition.to_string()));
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the VU setup hook [ScenarioDefinitionBuilder::setup_agent_fn] for this scenario.
    pub fn use_agent_setup(mut self, setup_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.setup_agent_fn = Some(setup_agent_fn);
        self
    }

    /// Set the behaviour [ScenarioDefinitionBuilder::agent_behaviour] for this scenario.
    pub fn use_agent_behaviour(mut self, behaviour: AgentHookMut<RV, V>) -> Self {
        self.agent_behaviour = Some(behaviour);
        self
    }

    /// Set the VU teardown hook [ScenarioDefinitionBuilder::teardown_agent_fn] for this scenario.
    pub fn use_agent_teardown(mut self, teardown_agent_fn: AgentHookMut<RV, V>) -> Self {
        self.teardown_agent_fn = Some(teardown_agent_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let schedule = self.schedule.ok_or(ScheduleError::Missing)?;
        schedule
            .validate()
            .with_context(|| format!("Invalid schedule for scenario {}", self.name))?;

        let agent_behaviour = self
            .agent_behaviour
            .ok_or_else(|| anyhow::anyhow!("Scenario {} has no behaviour", self.name))?;

        let thresholds = self
            .thresholds
            .iter()
            .map(|(metric, condition)| Threshold::parse(metric, condition))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid threshold for scenario {}", self.name))?;

        let iterations = self.cli.iterations.or(self.iterations);

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            schedule,
            iterations,
            graceful_stop: self.graceful_stop,
            thresholds,
            setup_fn: self.setup_fn,
            setup_agent_fn: self.setup_agent_fn,
            agent_behaviour,
            teardown_agent_fn: self.teardown_agent_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswind_instruments::ThresholdParseError;

    #[derive(Default, Debug)]
    struct Values;

    impl UserValuesConstraint for Values {}

    fn behaviour(_ctx: &mut AgentContext<Values, Values>) -> HookResult {
        Ok(())
    }

    fn builder() -> ScenarioDefinitionBuilder<Values, Values> {
        ScenarioDefinitionBuilder::new("test", CrosswindScenarioCli::default())
            .with_constant_vus(1, Duration::from_secs(1))
            .use_agent_behaviour(behaviour)
    }

    #[test]
    fn build_parses_thresholds() {
        let definition = builder()
            .with_threshold("http_req_failed", "rate<0.01")
            .with_threshold("http_req_duration{scenario:test}", "p(95)<400")
            .build()
            .unwrap();

        assert_eq!(2, definition.thresholds.len());
        assert_eq!(
            "http_req_duration{scenario:test}",
            definition.thresholds[1].metric_expression()
        );
    }

    #[test]
    fn invalid_threshold_is_a_configuration_error() {
        let err = builder()
            .with_threshold("http_req_failed", "rate!0.01")
            .build()
            .err()
            .unwrap();

        assert!(err.downcast_ref::<ThresholdParseError>().is_some());
    }

    #[test]
    fn missing_schedule_or_behaviour_is_rejected() {
        let no_schedule = ScenarioDefinitionBuilder::<Values, Values>::new(
            "test",
            CrosswindScenarioCli::default(),
        )
        .use_agent_behaviour(behaviour);
        assert!(no_schedule.build().is_err());

        let no_behaviour = ScenarioDefinitionBuilder::<Values, Values>::new(
            "test",
            CrosswindScenarioCli::default(),
        )
        .with_constant_vus(1, Duration::from_secs(1));
        assert!(no_behaviour.build().is_err());
    }

    #[test]
    fn cli_iterations_override_scenario() {
        let mut cli = CrosswindScenarioCli::default();
        cli.iterations = Some(7);

        let definition = ScenarioDefinitionBuilder::<Values, Values>::new("test", cli)
            .with_constant_vus(1, Duration::from_secs(1))
            .with_iterations(1)
            .use_agent_behaviour(behaviour)
            .build()
            .unwrap();
        assert_eq!(Some(7), definition.iterations);
    }
}

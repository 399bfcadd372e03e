use std::future::Future;
use std::{fmt::Debug, sync::Arc, time::Duration};

use crosswind_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use crosswind_instruments::{MetricsRegistry, MetricsScope};

use crate::{config::RunConfig, executor::Executor};

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every VU in a run.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    metrics: MetricsScope,
    stop_handle: ShutdownHandle,
    config: Arc<RunConfig>,
    scenario_name: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        registry: Arc<MetricsRegistry>,
        stop_handle: ShutdownHandle,
        config: Arc<RunConfig>,
        scenario_name: &str,
    ) -> Self {
        Self {
            executor,
            metrics: MetricsScope::for_scenario(registry, scenario_name),
            stop_handle,
            config,
            scenario_name: scenario_name.to_string(),
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Records into the run's registry, tagged with this scenario.
    pub fn metrics(&self) -> &MetricsScope {
        &self.metrics
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// Stop the scenario gracefully. No new iterations are started.
    pub fn force_stop_scenario(&self) {
        self.stop_handle.shutdown();
    }

    pub fn stop_listener(&self) -> DelegatedShutdownListener {
        self.stop_handle.new_listener()
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// State owned by a single VU. An agent is one virtual user and lives on its own thread.
pub struct AgentContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    agent_id: String,
    agent_index: usize,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    interrupt_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> AgentContext<RV, V> {
    pub(crate) fn new(
        agent_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        interrupt_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            agent_id: format!("vu-{agent_index}"),
            agent_index,
            iteration: 0,
            runner_context,
            interrupt_listener,
            value: Default::default(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_index(&self) -> usize {
        self.agent_index
    }

    /// The number of iterations this VU has started, including the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn start_iteration(&mut self) {
        self.iteration += 1;
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn config(&self) -> &RunConfig {
        self.runner_context.config()
    }

    pub fn metrics(&self) -> &MetricsScope {
        self.runner_context.metrics()
    }

    /// Record a check against the `checks` metric. Returns `passed`.
    pub fn check(&self, label: &str, passed: bool) -> bool {
        self.runner_context.metrics().check(label, passed)
    }

    /// Run async code to completion on the shared runtime.
    ///
    /// The future is cancelled, with a [crosswind_core::prelude::ShutdownSignalError], when the run
    /// is aborted or when this VU has been retired and its grace period is over.
    pub fn execute<T>(&self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        self.runner_context
            .executor()
            .execute_interruptible(fut, self.interrupt_listener.clone())
    }

    /// Think time between requests.
    pub fn sleep(&self, duration: Duration) -> anyhow::Result<()> {
        self.execute(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

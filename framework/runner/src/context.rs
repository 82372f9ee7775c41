use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use stampede_instruments::MetricsAggregator;
use url::Url;

use crate::executor::Executor;
use crate::shutdown::ShutdownHandle;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

impl UserValuesConstraint for () {}

/// State shared by the whole run.
///
/// Setup gets mutable access to fill in [RunnerContext::get_mut], after which the context is
/// shared read-only with every virtual user and with teardown.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    metrics: Arc<MetricsAggregator>,
    shutdown_handle: ShutdownHandle,
    run_id: String,
    base_url: Url,
    request_timeout: Duration,
    credentials: BTreeMap<String, String>,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        metrics: Arc<MetricsAggregator>,
        shutdown_handle: ShutdownHandle,
        run_id: String,
        base_url: Url,
        request_timeout: Duration,
        credentials: BTreeMap<String, String>,
    ) -> Self {
        Self {
            executor,
            metrics,
            shutdown_handle,
            run_id,
            base_url,
            request_timeout,
            credentials,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// The aggregator every request and check of the run is recorded in.
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).map(String::as_str)
    }

    pub fn credentials(&self) -> &BTreeMap<String, String> {
        &self.credentials
    }

    /// Stop the run as if Ctrl-C had been pressed. Virtual users finish their current iteration,
    /// then teardown runs and the thresholds are evaluated over what was collected.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// What a scenario action gets to work with on each iteration.
#[derive(Debug)]
pub struct VuContext<RV: UserValuesConstraint> {
    vu_index: usize,
    iteration: u64,
    scenario: String,
    runner_context: Arc<RunnerContext<RV>>,
}

// Manual impl so that `RV` doesn't need to be `Clone`.
impl<RV: UserValuesConstraint> Clone for VuContext<RV> {
    fn clone(&self) -> Self {
        Self {
            vu_index: self.vu_index,
            iteration: self.iteration,
            scenario: self.scenario.clone(),
            runner_context: self.runner_context.clone(),
        }
    }
}

impl<RV: UserValuesConstraint> VuContext<RV> {
    pub(crate) fn new(
        vu_index: usize,
        iteration: u64,
        scenario: String,
        runner_context: Arc<RunnerContext<RV>>,
    ) -> Self {
        Self {
            vu_index,
            iteration,
            scenario,
            runner_context,
        }
    }

    /// A readable id for logs, `vu-3`.
    pub fn vu_id(&self) -> String {
        format!("vu-{}", self.vu_index)
    }

    pub fn vu_index(&self) -> usize {
        self.vu_index
    }

    /// How many iterations this virtual user completed before this one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The name of the scenario selected for this iteration.
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        self.runner_context.metrics()
    }

    pub fn get(&self) -> &RV {
        self.runner_context.get()
    }
}

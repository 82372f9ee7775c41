use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use stampede_instruments::NoDataPolicy;

use crate::cli::StampedeScenarioCli;
use crate::config::{credentials_from_env, RunConfig};
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::plan::{PlanDefaults, PlanError, RunPlan, ScenarioPlan};
use crate::schedule::Stage;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;

/// One iteration of a scenario, run by a virtual user.
pub type ScenarioAction<RV> =
    Arc<dyn Fn(VuContext<RV>) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint> {
    /// The name of the test, which is reported in the summary.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: StampedeScenarioCli,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Global teardown hook, run once after every virtual user has stopped.
    teardown_fn: Option<GlobalHook<RV>>,
    actions: Vec<(String, ScenarioAction<RV>)>,
    defaults: PlanDefaults,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint> {
    pub name: String,
    pub cli: StampedeScenarioCli,
    pub plan: RunPlan,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
    pub actions: HashMap<String, ScenarioAction<RV>>,
}

impl<RV: UserValuesConstraint> ScenarioDefinitionBuilder<RV> {
    /// Initialise a new scenario definition from the test name and command line arguments.
    pub fn new(name: &str, cli: StampedeScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            setup_fn: None,
            teardown_fn: None,
            actions: Vec::new(),
            defaults: PlanDefaults::default(),
        }
    }

    /// Initialise logging, parse the command line and create a new scenario definition.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Replace the default stages. Overridden by the config file or by `--vus` and `--duration`.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.defaults.stages = stages;
        self
    }

    /// Append one stage to the default stages.
    pub fn with_default_stage(mut self, duration: Duration, target: u32) -> Self {
        self.defaults.stages.push(Stage::new(duration, target));
        self
    }

    /// The number of virtual users the first stage ramps from.
    pub fn with_default_start_vus(mut self, start_vus: u32) -> Self {
        self.defaults.start_vus = start_vus;
        self
    }

    /// Add a threshold that fails when the metric has no data.
    pub fn with_default_threshold(self, metric: &str, expr: &str) -> Self {
        self.with_default_threshold_policy(metric, expr, NoDataPolicy::Fail)
    }

    pub fn with_default_threshold_policy(
        mut self,
        metric: &str,
        expr: &str,
        no_data: NoDataPolicy,
    ) -> Self {
        self.defaults
            .thresholds
            .push((metric.to_string(), expr.to_string(), no_data));
        self
    }

    /// The delay between two iterations of a virtual user.
    pub fn with_default_pacing(mut self, pacing: Duration) -> Self {
        self.defaults.pacing = pacing;
        self
    }

    pub fn with_default_base_url(mut self, base_url: &str) -> Self {
        self.defaults.base_url = Some(base_url.to_string());
        self
    }

    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.request_timeout = timeout;
        self
    }

    pub fn with_default_credential(mut self, key: &str, value: &str) -> Self {
        self.defaults
            .credentials
            .insert(key.to_string(), value.to_string());
        self
    }

    /// How often the scheduler adjusts the number of running virtual users.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.defaults.tick_interval = tick_interval;
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    ///
    /// Teardown may run after the shutdown signal was raised, so async work in it should go
    /// through [crate::executor::Executor::block_on].
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Use a single scenario for every iteration.
    pub fn use_scenario<F, Fut>(self, action: F) -> Self
    where
        F: Fn(VuContext<RV>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.use_named_scenario("default", 1.0, action)
    }

    /// Add a named scenario that is picked with probability `weight / total weight` on each
    /// iteration. Scenarios keep the order they are added in.
    pub fn use_named_scenario<F, Fut>(mut self, name: &str, weight: f64, action: F) -> Self
    where
        F: Fn(VuContext<RV>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        let action: ScenarioAction<RV> = Arc::new(move |ctx| action(ctx).boxed());
        self.actions.push((name.to_string(), action));
        self.defaults.scenarios.push(ScenarioPlan {
            name: name.to_string(),
            weight,
            pacing: None,
        });
        self
    }

    /// Use a different pacing delay after iterations of the named scenario.
    pub fn with_scenario_pacing(mut self, name: &str, pacing: Duration) -> Self {
        match self.defaults.scenarios.iter_mut().find(|s| s.name == name) {
            Some(scenario) => scenario.pacing = Some(pacing),
            None => log::warn!("Cannot set pacing for unknown scenario [{name}]"),
        }
        self
    }

    pub(crate) fn build(self) -> Result<ScenarioDefinition<RV>, PlanError> {
        let mut seen = HashSet::new();
        if let Some((duplicate, _)) = self.actions.iter().find(|(name, _)| !seen.insert(name)) {
            return Err(PlanError::DuplicateScenario(duplicate.clone()));
        }

        let config = match &self.cli.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        let env_credentials: BTreeMap<_, _> = credentials_from_env(std::env::vars());
        let plan = RunPlan::resolve(self.defaults, config, &self.cli, env_credentials)?;

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            plan,
            setup_fn: self.setup_fn,
            teardown_fn: self.teardown_fn,
            actions: self.actions.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Values;

    impl UserValuesConstraint for Values {}

    async fn noop(_ctx: VuContext<Values>) -> HookResult {
        Ok(())
    }

    fn builder() -> ScenarioDefinitionBuilder<Values> {
        ScenarioDefinitionBuilder::new(
            "definition_test",
            StampedeScenarioCli {
                base_url: Some("http://127.0.0.1:1".to_string()),
                ..Default::default()
            },
        )
        .with_default_stage(Duration::from_secs(1), 1)
    }

    #[test]
    fn build_with_named_scenarios() {
        let definition = builder()
            .use_named_scenario("list", 3.0, noop)
            .use_named_scenario("create", 1.0, noop)
            .with_scenario_pacing("create", Duration::from_millis(10))
            .build()
            .unwrap();

        assert_eq!(2, definition.actions.len());
        assert_eq!(Duration::from_millis(10), definition.plan.pacing_for("create"));
        assert_eq!(Duration::from_secs(1), definition.plan.pacing_for("list"));
    }

    #[test]
    fn duplicate_scenarios_are_rejected() {
        let result = builder()
            .use_named_scenario("list", 1.0, noop)
            .use_named_scenario("list", 2.0, noop)
            .build();

        assert!(matches!(result, Err(PlanError::DuplicateScenario(name)) if name == "list"));
    }

    #[test]
    fn missing_scenarios_are_rejected() {
        assert!(matches!(builder().build(), Err(PlanError::NoScenarios)));
    }

    #[test]
    fn config_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[[scenarios]]\nname = \"unknown\"\nweight = 1\n")
            .unwrap();

        let result = ScenarioDefinitionBuilder::<Values>::new(
            "definition_test",
            StampedeScenarioCli {
                config: Some(file.path().to_path_buf()),
                base_url: Some("http://127.0.0.1:1".to_string()),
                ..Default::default()
            },
        )
        .with_default_stage(Duration::from_secs(1), 1)
        .use_scenario(noop)
        .build();

        assert!(matches!(result, Err(PlanError::UnknownScenario(name)) if name == "unknown"));
    }
}

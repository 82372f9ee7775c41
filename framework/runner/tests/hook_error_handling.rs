use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stampede_runner::prelude::{
    exit_code, run, HookResult, RunError, RunnerContext, ScenarioDefinitionBuilder,
    StampedeScenarioCli, UserValuesConstraint, VuBailError, VuContext, EXIT_SETUP_FAILED,
};

#[derive(Default, Debug)]
struct RunnerContextValue {
    iterations: AtomicUsize,
}

impl UserValuesConstraint for RunnerContextValue {}

fn sample_cli_cfg() -> StampedeScenarioCli {
    StampedeScenarioCli {
        base_url: Some("http://127.0.0.1:1".to_string()),
        no_progress: true,
        ..Default::default()
    }
}

fn short_scenario(name: &str) -> ScenarioDefinitionBuilder<RunnerContextValue> {
    ScenarioDefinitionBuilder::<RunnerContextValue>::new(name, sample_cli_cfg())
        .with_default_start_vus(2)
        .with_default_stage(Duration::from_millis(300), 2)
        .with_default_pacing(Duration::from_millis(10))
        .with_tick_interval(Duration::from_millis(20))
}

async fn count_iteration(ctx: VuContext<RunnerContextValue>) -> HookResult {
    ctx.get().iterations.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[test]
fn propagate_error_in_setup_hook() {
    static ACTIONS_RUN: AtomicUsize = AtomicUsize::new(0);

    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    async fn action(_ctx: VuContext<RunnerContextValue>) -> HookResult {
        ACTIONS_RUN.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    let scenario = short_scenario("propagate_error_in_setup_hook")
        .use_setup(setup)
        .use_scenario(action);

    let result = run(scenario);

    assert_eq!(
        std::process::ExitCode::from(EXIT_SETUP_FAILED),
        exit_code(&result)
    );
    match result {
        Err(RunError::Setup(e)) => assert_eq!("Error in setup hook", e.to_string()),
        other => panic!("expected a setup failure, got {other:?}"),
    }
    assert_eq!(0, ACTIONS_RUN.load(Ordering::SeqCst));
}

#[test]
fn setup_values_are_shared_with_every_vu() {
    fn setup(ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        ctx.get_mut().iterations.store(1000, Ordering::SeqCst);
        Ok(())
    }

    fn teardown(ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        assert!(ctx.get().iterations.load(Ordering::SeqCst) > 1000);
        Ok(())
    }

    let scenario = short_scenario("setup_values_are_shared_with_every_vu")
        .use_setup(setup)
        .use_scenario(count_iteration)
        .use_teardown(teardown);

    let report = run(scenario).unwrap();

    assert!(report.passed());
    assert_eq!(None, report.summary.teardown_error);
}

#[test]
fn capture_error_in_scenario_and_continue() {
    async fn failing(ctx: VuContext<RunnerContextValue>) -> HookResult {
        ctx.get().iterations.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("Error in scenario"))
    }

    fn teardown(ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        // Two users for 300ms with 10ms pacing get through many more than one iteration each.
        assert!(ctx.get().iterations.load(Ordering::SeqCst) > 2);
        Ok(())
    }

    let scenario = short_scenario("capture_error_in_scenario_and_continue")
        .use_scenario(failing)
        .use_teardown(teardown);

    let report = run(scenario).unwrap();

    assert!(report.passed());
    assert_eq!(None, report.summary.teardown_error);
}

#[test]
fn bailing_vu_stops_iterating() {
    async fn bail(_ctx: VuContext<RunnerContextValue>) -> HookResult {
        Err(VuBailError::default().into())
    }

    let scenario = short_scenario("bailing_vu_stops_iterating").use_scenario(bail);

    let report = run(scenario).unwrap();

    assert!(!report.summary.interrupted);
    assert!(report.summary.vus_started >= 2);
}

#[test]
fn teardown_error_is_reported_without_changing_the_verdict() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("cleanup endpoint unavailable"))
    }

    let scenario = short_scenario("teardown_error_is_reported_without_changing_the_verdict")
        .use_scenario(count_iteration)
        .use_teardown(teardown);

    let report = run(scenario).unwrap();

    assert!(report.passed());
    assert_eq!(0, report.exit_code());
    assert_eq!(
        Some("cleanup endpoint unavailable".to_string()),
        report.summary.teardown_error
    );
}

#[test]
fn force_stop_interrupts_the_run() {
    async fn stop_after_a_few(ctx: VuContext<RunnerContextValue>) -> HookResult {
        if ctx.get().iterations.fetch_add(1, Ordering::SeqCst) >= 5 {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }
        Ok(())
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue>::new(
        "force_stop_interrupts_the_run",
        sample_cli_cfg(),
    )
    .with_default_start_vus(2)
    .with_default_stage(Duration::from_secs(60), 2)
    .with_default_pacing(Duration::from_millis(10))
    .with_tick_interval(Duration::from_millis(20))
    .use_scenario(stop_after_a_few);

    let report = run(scenario).unwrap();

    assert!(report.summary.interrupted);
    assert!(report.summary.run_duration_ms < 30_000);
}

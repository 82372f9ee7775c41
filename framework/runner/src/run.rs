use std::sync::Arc;

use anyhow::Context;
use stampede_instruments::{builtin, evaluate, print_summary, MetricsAggregator, ThresholdResult};
use stampede_summary_model::{write_run_summary, RunSummary, StageSummary};

use crate::dispatch::ScenarioDispatcher;
use crate::exit::{RunError, RunReport};
use crate::monitor::start_monitor;
use crate::plan::PlanError;
use crate::progress::start_progress;
use crate::schedule::run_schedule;
use crate::shutdown::ShutdownHandle;
use crate::vu::{run_vu, VuScenario, VuShared};
use crate::{
    context::{RunnerContext, UserValuesConstraint},
    definition::ScenarioDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// Run a scenario: setup, the stages, teardown, then threshold evaluation.
///
/// Returns the verdict and summary of the run, or why no verdict could be reached. Pass the result
/// to [crate::exit::exit_code] to get the process exit status.
pub fn run<RV: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV>,
) -> Result<RunReport, RunError> {
    let definition = definition.build()?;
    let plan = &definition.plan;

    log::info!("Running scenario: {}", definition.name);

    let scenarios = plan
        .scenarios
        .iter()
        .map(|s| {
            let action = definition
                .actions
                .get(&s.name)
                .cloned()
                .ok_or_else(|| PlanError::UnknownScenario(s.name.clone()))?;
            Ok((
                s.name.clone(),
                s.weight,
                VuScenario {
                    action,
                    pacing: plan.pacing_for(&s.name),
                },
            ))
        })
        .collect::<Result<Vec<_>, PlanError>>()?;
    let dispatcher = ScenarioDispatcher::new(scenarios)?;

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create Tokio runtime")
        .map_err(RunError::Internal)?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let metrics = Arc::new(MetricsAggregator::new());
    let iteration_duration = metrics
        .distribution(builtin::ITERATION_DURATION)
        .map_err(|e| RunError::Internal(e.into()))?;

    let run_id = definition
        .cli
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now();

    let mut runner_context = RunnerContext::new(
        executor.clone(),
        metrics.clone(),
        shutdown_handle.clone(),
        run_id.clone(),
        plan.base_url.clone(),
        plan.request_timeout,
        plan.credentials.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        if let Err(e) = setup_fn(&mut runner_context) {
            log::error!("Setup failed, no virtual users were started: {e:?}");
            return Err(RunError::Setup(e));
        }
    }

    let runner_context = Arc::new(runner_context);

    // Separate from the shutdown handle so that reporting threads stop when the stages end, even
    // if nobody asked for a shutdown.
    let stages_done = ShutdownHandle::new();
    if !definition.cli.no_progress {
        start_progress(plan.stages.total_duration(), stages_done.new_listener());
    }

    // Ready to start spawning virtual users so start the resource monitor to report high usage
    // which might lead to a misleading outcome.
    start_monitor(stages_done.new_listener());

    let shared = Arc::new(VuShared {
        dispatcher,
        runner_context: runner_context.clone(),
        seed: plan.seed,
        iteration_duration,
    });

    log::info!(
        "Starting {} stages over {:?}, peaking at {} virtual users",
        plan.stages.stages().len(),
        plan.stages.total_duration(),
        plan.stages.peak_target()
    );
    let report = executor.block_on(run_schedule(
        &plan.stages,
        plan.tick_interval,
        shutdown_handle.new_listener(),
        |vu_index, stop| tokio::spawn(run_vu(vu_index, shared.clone(), stop)),
    ));
    stages_done.shutdown();
    drop(shared);

    let teardown_error = definition.teardown_fn.and_then(|teardown_fn| {
        // Don't fail the run if teardown fails, the verdict only depends on the thresholds.
        teardown_fn(runner_context.clone()).err().map(|e| {
            log::error!("Teardown failed: {e:?}");
            format!("{e:#}")
        })
    });

    let snapshot = metrics.snapshot();
    let verdict = evaluate(&plan.thresholds, &snapshot);

    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        started_at.timestamp(),
        plan.stages
            .stages()
            .iter()
            .map(|s| StageSummary {
                duration_ms: s.duration.as_millis() as u64,
                target: s.target,
            })
            .collect(),
        plan.scenarios
            .iter()
            .map(|s| (s.name.clone(), s.weight))
            .collect(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    summary.run_duration_ms = report.elapsed.as_millis() as u64;
    summary.interrupted = report.interrupted;
    summary.peak_vus = report.peak_vus;
    summary.vus_started = report.vus_started;
    summary.metrics = snapshot.summaries();
    summary.checks = snapshot.checks().to_vec();
    summary.thresholds = verdict.results.iter().map(ThresholdResult::summary).collect();
    summary.passed = verdict.passed();
    summary.teardown_error = teardown_error;
    summary.add_env("BASE_URL".to_string(), plan.base_url.to_string());
    if let Some(seed) = plan.seed {
        summary.add_env("SEED".to_string(), seed.to_string());
    }

    print_summary(&summary);
    log::info!("Run summary fingerprint: {}", summary.fingerprint());

    if let Some(path) = &definition.cli.summary_out {
        match write_run_summary(&summary, path) {
            Ok(()) => log::info!("Run summary written to {}", path.display()),
            Err(e) => log::error!("Failed to write run summary to {}: {e:?}", path.display()),
        }
    }

    Ok(RunReport { verdict, summary })
}

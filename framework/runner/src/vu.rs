use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use stampede_core::prelude::VuBailError;
use stampede_instruments::DistributionMetric;

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::ScenarioAction;
use crate::dispatch::ScenarioDispatcher;
use crate::shutdown::{DelegatedShutdownListener, ShutdownSignalError};

/// A scenario as a virtual user runs it.
pub(crate) struct VuScenario<RV: UserValuesConstraint> {
    pub action: ScenarioAction<RV>,
    pub pacing: Duration,
}

/// What every virtual user of a run shares.
pub(crate) struct VuShared<RV: UserValuesConstraint> {
    pub dispatcher: ScenarioDispatcher<VuScenario<RV>>,
    pub runner_context: Arc<RunnerContext<RV>>,
    pub seed: Option<u64>,
    pub iteration_duration: DistributionMetric,
}

/// The loop of one virtual user: pick a scenario, run it, wait out the pacing delay, repeat until
/// asked to stop.
///
/// The stop signal is only checked between iterations and while pacing, a running action is
/// never interrupted.
pub(crate) async fn run_vu<RV: UserValuesConstraint>(
    vu_index: usize,
    shared: Arc<VuShared<RV>>,
    mut stop: DelegatedShutdownListener,
) {
    let mut rng = match shared.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(vu_index as u64)),
        None => StdRng::from_entropy(),
    };

    log::debug!("vu-{vu_index} started");

    let mut iteration = 0;
    while !stop.should_shutdown() {
        let (name, scenario) = shared.dispatcher.select(&mut rng);
        let ctx = VuContext::new(
            vu_index,
            iteration,
            name.to_string(),
            shared.runner_context.clone(),
        );

        let started = Instant::now();
        let result = (scenario.action)(ctx).await;
        shared.iteration_duration.add_duration(started.elapsed());
        iteration += 1;

        match result {
            Ok(()) => {}
            Err(e) if e.is::<VuBailError>() => {
                log::warn!("vu-{vu_index} is bailing after scenario [{name}]: {e}");
                break;
            }
            Err(e) if e.is::<ShutdownSignalError>() => {
                // Expected while the run is being stopped.
            }
            Err(e) => {
                log::warn!("Scenario [{name}] failed for vu-{vu_index}: {e:?}");
            }
        }

        if scenario.pacing.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(scenario.pacing) => {},
                _ = stop.wait_for_shutdown() => {},
            }
        }
    }

    log::debug!("vu-{vu_index} stopped after {iteration} iterations");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::HookResult;
    use crate::executor::Executor;
    use crate::shutdown::ShutdownHandle;
    use futures::FutureExt;
    use stampede_instruments::{builtin, MetricsAggregator};
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    #[derive(Debug, Default)]
    struct Counter {
        runs: AtomicUsize,
    }

    impl UserValuesConstraint for Counter {}

    fn shared(
        pacing: Duration,
        action: ScenarioAction<Counter>,
    ) -> (Arc<VuShared<Counter>>, Arc<MetricsAggregator>) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let metrics = Arc::new(MetricsAggregator::new());
        let runner_context = RunnerContext::new(
            Arc::new(Executor::new(runtime, ShutdownHandle::new())),
            metrics.clone(),
            ShutdownHandle::new(),
            "test".to_string(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            Duration::from_secs(1),
            BTreeMap::new(),
        );

        let shared = VuShared {
            dispatcher: ScenarioDispatcher::new(vec![(
                "count".to_string(),
                1.0,
                VuScenario { action, pacing },
            )])
            .unwrap(),
            runner_context: Arc::new(runner_context),
            seed: Some(1),
            iteration_duration: metrics.distribution(builtin::ITERATION_DURATION).unwrap(),
        };
        (Arc::new(shared), metrics)
    }

    fn action<F, Fut>(f: F) -> ScenarioAction<Counter>
    where
        F: Fn(VuContext<Counter>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Arc::new(move |ctx| f(ctx).boxed())
    }

    fn counting_action() -> ScenarioAction<Counter> {
        action(|ctx| async move {
            ctx.get().runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn pacing_is_cut_short_by_stop() {
        let (shared, metrics) = shared(Duration::from_secs(60), counting_action());
        let stop = ShutdownHandle::new();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let vu = tokio::spawn(run_vu(0, shared.clone(), stop.new_listener()));
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.shutdown();
            tokio::time::timeout(Duration::from_secs(5), vu)
                .await
                .expect("virtual user should stop while pacing")
                .unwrap();
        });

        assert_eq!(1, shared.runner_context.get().runs.load(Ordering::SeqCst));
        assert_eq!(
            Some(1),
            metrics
                .snapshot()
                .get(builtin::ITERATION_DURATION)
                .map(|s| s.count())
        );
    }

    #[test]
    fn bail_ends_the_virtual_user() {
        let bail_on_third = action(|ctx| async move {
            if ctx.get().runs.fetch_add(1, Ordering::SeqCst) >= 2 {
                return Err(VuBailError::new("enough").into());
            }
            Ok(())
        });
        let (shared, _) = shared(Duration::ZERO, bail_on_third);

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(run_vu(0, shared.clone(), ShutdownHandle::new().new_listener()));

        assert_eq!(3, shared.runner_context.get().runs.load(Ordering::SeqCst));
    }

    #[test]
    fn errors_do_not_stop_the_loop() {
        let always_fails = action(|ctx| async move {
            ctx.get().runs.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("request went wrong"))
        });
        let (shared, _) = shared(Duration::from_millis(1), always_fails);
        let stop = ShutdownHandle::new();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let vu = tokio::spawn(run_vu(0, shared.clone(), stop.new_listener()));
            while shared.runner_context.get().runs.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            stop.shutdown();
            vu.await.unwrap();
        });

        assert!(shared.runner_context.get().runs.load(Ordering::SeqCst) >= 5);
    }
}

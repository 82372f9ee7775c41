use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::plan::PlanError;
use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};

/// The longest run a plan may describe.
pub const MAX_RUN_DURATION: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// One ramp stage: over `duration` the target moves linearly from the previous stage's target to
/// `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// The validated stages of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    start_vus: u32,
    stages: Vec<Stage>,
    total_duration: Duration,
}

impl StagePlan {
    pub fn new(start_vus: u32, stages: Vec<Stage>) -> Result<Self, PlanError> {
        if stages.is_empty() {
            return Err(PlanError::NoStages);
        }
        if let Some(index) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(PlanError::ZeroDuration { index });
        }

        let total_duration = stages
            .iter()
            .try_fold(Duration::ZERO, |total, s| total.checked_add(s.duration))
            .filter(|total| *total <= MAX_RUN_DURATION)
            .ok_or(PlanError::RunTooLong {
                max: MAX_RUN_DURATION,
            })?;

        Ok(Self {
            start_vus,
            stages,
            total_duration,
        })
    }

    pub fn start_vus(&self) -> u32 {
        self.start_vus
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// The exact target at `elapsed`, 0 once every stage is over.
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        let mut from = self.start_vus as f64;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            let to = stage.target as f64;
            if elapsed < stage_end {
                let progress =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return from + (to - from) * progress;
            }
            from = to;
            stage_start = stage_end;
        }

        0.0
    }

    /// The number of virtual users that should be running at `elapsed`.
    pub fn target_vus_at(&self, elapsed: Duration) -> usize {
        self.target_at(elapsed).floor() as usize
    }

    pub fn peak_target(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u32::max)
    }
}

#[derive(Debug)]
struct RunningVu {
    index: usize,
    stop: ShutdownHandle,
    handle: JoinHandle<()>,
}

/// The virtual users the scheduler has started and not yet collected.
#[derive(Debug, Default)]
struct VuPool {
    active: Vec<RunningVu>,
    retiring: Vec<RunningVu>,
    started: usize,
    peak: usize,
}

impl VuPool {
    fn live(&self) -> usize {
        self.active.len() + self.retiring.len()
    }

    fn reap(&mut self) {
        self.active.retain(|vu| !vu.handle.is_finished());
        self.retiring.retain(|vu| !vu.handle.is_finished());
    }

    fn scale_to<F>(&mut self, target: usize, spawn_vu: &mut F)
    where
        F: FnMut(usize, DelegatedShutdownListener) -> JoinHandle<()>,
    {
        self.reap();

        // Retiring users still hold a slot until their iteration ends.
        while self.live() < target {
            let index = self.started;
            let stop = ShutdownHandle::new();
            let handle = spawn_vu(index, stop.new_listener());
            log::trace!("Started virtual user {index}");
            self.active.push(RunningVu {
                index,
                stop,
                handle,
            });
            self.started += 1;
        }

        // Newest first, so long running users keep their place.
        while self.active.len() > target {
            if let Some(vu) = self.active.pop() {
                log::trace!("Asking virtual user {} to stop", vu.index);
                vu.stop.shutdown();
                self.retiring.push(vu);
            }
        }

        self.peak = self.peak.max(self.live());
    }

    async fn drain(&mut self) {
        for vu in &self.active {
            vu.stop.shutdown();
        }

        for vu in self.active.drain(..).chain(self.retiring.drain(..)) {
            if let Err(e) = vu.handle.await {
                log::error!("Virtual user {} did not exit cleanly: {e}", vu.index);
            }
        }
    }
}

/// What happened while the stages were being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleReport {
    pub vus_started: usize,
    pub peak_vus: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// Drive the number of running virtual users along the stage plan.
///
/// Every `tick` the live count is compared with the target. Missing users are started with
/// `spawn_vu`, surplus users are told to stop after their current iteration. Once the stages are
/// over, or `shutdown` is raised, every user is stopped and awaited before this returns.
pub async fn run_schedule<F>(
    plan: &StagePlan,
    tick: Duration,
    mut shutdown: DelegatedShutdownListener,
    mut spawn_vu: F,
) -> ScheduleReport
where
    F: FnMut(usize, DelegatedShutdownListener) -> JoinHandle<()>,
{
    let start = Instant::now();
    let end = start + plan.total_duration();
    let mut pool = VuPool::default();
    let mut interrupted = false;

    loop {
        if shutdown.should_shutdown() {
            log::info!("Stopping the run early, {} virtual users live", pool.live());
            interrupted = true;
            break;
        }

        let now = Instant::now();
        if now >= end {
            break;
        }

        pool.scale_to(plan.target_vus_at(now - start), &mut spawn_vu);

        let next_tick = (now + tick).min(end);
        tokio::select! {
            _ = tokio::time::sleep_until(next_tick) => {},
            _ = shutdown.wait_for_shutdown() => {},
        }
    }

    log::debug!("Stages complete, draining {} virtual users", pool.live());
    pool.drain().await;

    ScheduleReport {
        vus_started: pool.started,
        peak_vus: pool.peak,
        interrupted,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn ramp_plan() -> StagePlan {
        StagePlan::new(
            0,
            vec![
                Stage::new(secs(10), 50),
                Stage::new(secs(20), 200),
                Stage::new(secs(10), 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn validation() {
        assert!(matches!(StagePlan::new(0, vec![]), Err(PlanError::NoStages)));
        assert!(matches!(
            StagePlan::new(0, vec![Stage::new(secs(1), 1), Stage::new(Duration::ZERO, 2)]),
            Err(PlanError::ZeroDuration { index: 1 })
        ));
    }

    #[test]
    fn total_duration_is_bounded() {
        let forever = Duration::from_secs(3_000_000_000_000_000 * 3600);
        assert!(matches!(
            StagePlan::new(0, vec![Stage::new(forever, 1), Stage::new(forever, 1)]),
            Err(PlanError::RunTooLong { .. })
        ));
        assert!(matches!(
            StagePlan::new(0, vec![Stage::new(Duration::MAX, 1), Stage::new(secs(1), 1)]),
            Err(PlanError::RunTooLong { .. })
        ));

        let year = StagePlan::new(0, vec![Stage::new(MAX_RUN_DURATION, 1)]).unwrap();
        assert_eq!(MAX_RUN_DURATION, year.total_duration());
    }

    #[test]
    fn target_follows_linear_ramps() {
        let plan = ramp_plan();

        assert_eq!(0.0, plan.target_at(Duration::ZERO));
        assert_eq!(25.0, plan.target_at(secs(5)));
        assert_eq!(50.0, plan.target_at(secs(10)));
        assert_eq!(125.0, plan.target_at(secs(20)));
        assert_eq!(200.0, plan.target_at(secs(30)));
        assert_eq!(100.0, plan.target_at(secs(35)));
        assert_eq!(0.0, plan.target_at(secs(40)));
        assert_eq!(0.0, plan.target_at(secs(400)));

        assert_eq!(secs(40), plan.total_duration());
        assert_eq!(200, plan.peak_target());
    }

    #[test]
    fn target_vus_round_down() {
        let plan = StagePlan::new(0, vec![Stage::new(secs(4), 3)]).unwrap();

        assert_eq!(0, plan.target_vus_at(secs(1)));
        assert_eq!(1, plan.target_vus_at(Duration::from_millis(1500)));
        assert_eq!(2, plan.target_vus_at(Duration::from_millis(3999)));
    }

    #[test]
    fn plateau_starts_from_start_vus() {
        let plan = StagePlan::new(5, vec![Stage::new(secs(10), 5), Stage::new(secs(10), 5)])
            .unwrap();

        for s in 0..20 {
            assert_eq!(5, plan.target_vus_at(secs(s)));
        }
    }

    fn counting_vus(
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    ) -> impl FnMut(usize, DelegatedShutdownListener) -> JoinHandle<()> {
        move |_, mut stop| {
            started.fetch_add(1, Ordering::SeqCst);
            let stopped = stopped.clone();
            tokio::spawn(async move {
                stop.wait_for_shutdown().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn ramp_up_plateau_and_drain() {
        let plan = StagePlan::new(
            0,
            vec![
                Stage::new(Duration::from_millis(100), 4),
                Stage::new(Duration::from_millis(200), 4),
                Stage::new(Duration::from_millis(100), 0),
            ],
        )
        .unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));

        let report = run_schedule(
            &plan,
            Duration::from_millis(5),
            ShutdownHandle::new().new_listener(),
            counting_vus(started.clone(), stopped.clone()),
        )
        .await;

        assert!(!report.interrupted);
        assert_eq!(4, report.peak_vus);
        assert_eq!(4, report.vus_started);
        assert_eq!(4, started.load(Ordering::SeqCst));
        assert_eq!(4, stopped.load(Ordering::SeqCst));
        assert!(report.elapsed >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn retiring_users_count_against_the_target() {
        // Two users, down to none, back up to two while the first two are still mid iteration.
        let plan = StagePlan::new(
            2,
            vec![
                Stage::new(Duration::from_millis(40), 0),
                Stage::new(Duration::from_millis(40), 2),
                Stage::new(Duration::from_millis(300), 2),
            ],
        )
        .unwrap();
        let started = Arc::new(AtomicUsize::new(0));

        let counter = started.clone();
        let report = run_schedule(
            &plan,
            Duration::from_millis(5),
            ShutdownHandle::new().new_listener(),
            move |_, mut stop| {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    stop.wait_for_shutdown().await;
                })
            },
        )
        .await;

        assert!(report.peak_vus <= plan.peak_target() as usize);
        assert_eq!(2, report.vus_started);
        assert_eq!(2, started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_stages() {
        let plan = StagePlan::new(3, vec![Stage::new(secs(60), 3)]).unwrap();
        let shutdown = ShutdownHandle::new();
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.shutdown();
        });

        let report = run_schedule(
            &plan,
            Duration::from_millis(10),
            shutdown.new_listener(),
            counting_vus(started.clone(), stopped.clone()),
        )
        .await;

        assert!(report.interrupted);
        assert!(report.elapsed < secs(5));
        assert_eq!(3, report.peak_vus);
        assert_eq!(3, stopped.load(Ordering::SeqCst));
    }
}

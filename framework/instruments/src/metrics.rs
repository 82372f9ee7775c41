use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::builtin;
use crate::outcome::Outcome;
use crate::snapshot::{MetricsSnapshot, SeriesSnapshot};
use stampede_summary_model::CheckSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Rate,
    Distribution,
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Rate => write!(f, "rate"),
            MetricKind::Distribution => write!(f, "distribution"),
        }
    }
}

/// Returned when a series is requested as one kind but was already registered as the other.
#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("Metric [{name}] is already registered as a {existing} series")]
pub struct MetricKindMismatch {
    name: String,
    existing: MetricKind,
}

#[derive(Debug, Default, Clone, Copy)]
struct RateCounts {
    passes: u64,
    fails: u64,
}

/// Handle to a rate series. Cheap to clone, every clone writes to the same series.
#[derive(Debug, Clone, Default)]
pub struct RateMetric {
    counts: Arc<Mutex<RateCounts>>,
}

impl RateMetric {
    pub fn add(&self, value: bool) {
        let mut counts = self.counts.lock();
        if value {
            counts.passes += 1;
        } else {
            counts.fails += 1;
        }
    }

    fn snapshot(&self) -> SeriesSnapshot {
        let counts = *self.counts.lock();
        SeriesSnapshot::Rate {
            passes: counts.passes,
            fails: counts.fails,
        }
    }
}

/// Handle to a distribution series. Cheap to clone, every clone writes to the same series.
#[derive(Debug, Clone, Default)]
pub struct DistributionMetric {
    values: Arc<Mutex<Vec<f64>>>,
}

impl DistributionMetric {
    pub fn add(&self, value: f64) {
        self.values.lock().push(value);
    }

    /// Record a duration in milliseconds.
    pub fn add_duration(&self, duration: Duration) {
        self.add(duration.as_secs_f64() * 1000.0);
    }

    fn snapshot(&self) -> SeriesSnapshot {
        let mut sorted = self.values.lock().clone();
        sorted.sort_by(f64::total_cmp);
        SeriesSnapshot::Distribution { sorted }
    }
}

#[derive(Debug, Clone)]
enum Series {
    Rate(RateMetric),
    Distribution(DistributionMetric),
}

impl Series {
    fn kind(&self) -> MetricKind {
        match self {
            Series::Rate(_) => MetricKind::Rate,
            Series::Distribution(_) => MetricKind::Distribution,
        }
    }
}

/// Accumulates every metric series for a run.
///
/// The registry lock is only taken to look up or register a series. Observations go through the
/// series' own lock, so writers to different series never contend with each other. Hot paths
/// should hold on to the handle returned by [MetricsAggregator::rate] or
/// [MetricsAggregator::distribution] rather than looking it up per observation.
#[derive(Debug)]
pub struct MetricsAggregator {
    series: RwLock<HashMap<String, Series>>,
    checks: RwLock<BTreeMap<String, RateMetric>>,
    http_req_duration: DistributionMetric,
    http_req_failed: RateMetric,
    checks_rate: RateMetric,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        let http_req_duration = DistributionMetric::default();
        let http_req_failed = RateMetric::default();
        let checks_rate = RateMetric::default();

        let series = HashMap::from([
            (
                builtin::HTTP_REQ_DURATION.to_string(),
                Series::Distribution(http_req_duration.clone()),
            ),
            (
                builtin::HTTP_REQ_FAILED.to_string(),
                Series::Rate(http_req_failed.clone()),
            ),
            (builtin::CHECKS.to_string(), Series::Rate(checks_rate.clone())),
        ]);

        Self {
            series: RwLock::new(series),
            checks: RwLock::new(BTreeMap::new()),
            http_req_duration,
            http_req_failed,
            checks_rate,
        }
    }

    /// Get the rate series with this name, registering it on first use.
    pub fn rate(&self, name: &str) -> Result<RateMetric, MetricKindMismatch> {
        match self.get_or_register(name, || Series::Rate(RateMetric::default()))? {
            Series::Rate(metric) => Ok(metric),
            other => Err(MetricKindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }

    /// Get the distribution series with this name, registering it on first use.
    pub fn distribution(&self, name: &str) -> Result<DistributionMetric, MetricKindMismatch> {
        match self.get_or_register(name, || Series::Distribution(DistributionMetric::default()))? {
            Series::Distribution(metric) => Ok(metric),
            other => Err(MetricKindMismatch {
                name: name.to_string(),
                existing: other.kind(),
            }),
        }
    }

    fn get_or_register(
        &self,
        name: &str,
        make: impl FnOnce() -> Series,
    ) -> Result<Series, MetricKindMismatch> {
        if let Some(series) = self.series.read().get(name) {
            return Ok(series.clone());
        }

        let mut series = self.series.write();
        let entry = series.entry(name.to_string()).or_insert_with(|| {
            log::debug!("Registered metric series [{name}]");
            make()
        });
        Ok(entry.clone())
    }

    /// Record the result of one named check, both in the `checks` rate and in the tally for the
    /// check itself.
    pub fn record_check(&self, name: &str, passed: bool) {
        self.checks_rate.add(passed);

        let tally = self.checks.read().get(name).cloned();
        let tally = match tally {
            Some(tally) => tally,
            None => self
                .checks
                .write()
                .entry(name.to_string())
                .or_default()
                .clone(),
        };
        tally.add(passed);
    }

    /// Record one request attempt into the built-in HTTP series and the check tallies.
    pub fn record_outcome(&self, outcome: &Outcome) {
        self.http_req_duration.add_duration(outcome.latency);
        self.http_req_failed.add(outcome.is_failure());

        for (name, passed) in outcome.check_results() {
            self.record_check(name, *passed);
        }
    }

    /// Take a consistent copy of every series.
    ///
    /// Intended to be called once the run has finished, at which point it reflects every
    /// completed write.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let series = self
            .series
            .read()
            .iter()
            .map(|(name, series)| {
                let snapshot = match series {
                    Series::Rate(metric) => metric.snapshot(),
                    Series::Distribution(metric) => metric.snapshot(),
                };
                (name.clone(), snapshot)
            })
            .collect();

        let checks = self
            .checks
            .read()
            .iter()
            .map(|(name, metric)| {
                let counts = *metric.counts.lock();
                CheckSummary {
                    name: name.clone(),
                    passes: counts.passes,
                    fails: counts.fails,
                }
            })
            .collect();

        MetricsSnapshot::new(series, checks)
    }
}

use std::collections::BTreeMap;

use stampede_summary_model::{CheckSummary, MetricSummary};

use crate::builtin;
use crate::metrics::MetricKind;

/// A frozen copy of one series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesSnapshot {
    Rate { passes: u64, fails: u64 },
    /// Every observed value, sorted ascending.
    Distribution { sorted: Vec<f64> },
}

impl SeriesSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            SeriesSnapshot::Rate { .. } => MetricKind::Rate,
            SeriesSnapshot::Distribution { .. } => MetricKind::Distribution,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            SeriesSnapshot::Rate { passes, fails } => passes + fails,
            SeriesSnapshot::Distribution { sorted } => sorted.len() as u64,
        }
    }

    /// Fraction of `true` observations. Only defined for a non-empty rate series.
    pub fn rate(&self) -> Option<f64> {
        match self {
            SeriesSnapshot::Rate { passes, fails } if passes + fails > 0 => {
                Some(*passes as f64 / (passes + fails) as f64)
            }
            _ => None,
        }
    }

    fn values(&self) -> Option<&[f64]> {
        match self {
            SeriesSnapshot::Distribution { sorted } if !sorted.is_empty() => Some(sorted.as_slice()),
            _ => None,
        }
    }

    pub fn min(&self) -> Option<f64> {
        self.values().and_then(|v| v.first().copied())
    }

    pub fn max(&self) -> Option<f64> {
        self.values().and_then(|v| v.last().copied())
    }

    pub fn mean(&self) -> Option<f64> {
        self.values().map(|v| v.iter().sum::<f64>() / v.len() as f64)
    }

    /// The `p`th percentile, interpolating linearly between the two closest ranks.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let values = self.values()?;
        let rank = (p.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let weight = rank - lower as f64;

        Some(values[lower] + (values[upper] - values[lower]) * weight)
    }

    pub fn summary(&self) -> MetricSummary {
        match self {
            SeriesSnapshot::Rate { passes, fails } => MetricSummary::Rate {
                passes: *passes,
                fails: *fails,
                rate: self.rate().unwrap_or(0.0),
            },
            SeriesSnapshot::Distribution { sorted } => MetricSummary::Distribution {
                count: sorted.len() as u64,
                min: self.min().unwrap_or(0.0),
                max: self.max().unwrap_or(0.0),
                avg: self.mean().unwrap_or(0.0),
                med: self.percentile(50.0).unwrap_or(0.0),
                p90: self.percentile(90.0).unwrap_or(0.0),
                p95: self.percentile(95.0).unwrap_or(0.0),
                p99: self.percentile(99.0).unwrap_or(0.0),
            },
        }
    }
}

/// Every series and check tally of a run, as of the moment it was taken.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    series: BTreeMap<String, SeriesSnapshot>,
    checks: Vec<CheckSummary>,
}

impl MetricsSnapshot {
    pub fn new(series: BTreeMap<String, SeriesSnapshot>, checks: Vec<CheckSummary>) -> Self {
        Self { series, checks }
    }

    /// Look up a series by name. `http_reqs` resolves to the request latency series, which has
    /// one observation per request.
    pub fn get(&self, name: &str) -> Option<&SeriesSnapshot> {
        match self.series.get(name) {
            None if name == builtin::HTTP_REQS => self.series.get(builtin::HTTP_REQ_DURATION),
            found => found,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SeriesSnapshot)> {
        self.series.iter()
    }

    pub fn checks(&self) -> &[CheckSummary] {
        &self.checks
    }

    /// Summaries of the series that received at least one observation.
    pub fn summaries(&self) -> BTreeMap<String, MetricSummary> {
        self.series
            .iter()
            .filter(|(_, series)| series.count() > 0)
            .map(|(name, series)| (name.clone(), series.summary()))
            .collect()
    }
}

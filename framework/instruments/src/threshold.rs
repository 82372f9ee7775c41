use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use stampede_summary_model::ThresholdSummary;

use crate::metrics::MetricKind;
use crate::snapshot::{MetricsSnapshot, SeriesSnapshot};

/// Which aggregate of a series a threshold compares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl Aggregation {
    /// The aggregate value, or `None` if this aggregation does not apply to the series' kind.
    fn apply(&self, series: &SeriesSnapshot) -> Option<f64> {
        match (self, series.kind()) {
            (Aggregation::Count, _) => Some(series.count() as f64),
            (Aggregation::Rate, MetricKind::Rate) => series.rate(),
            (Aggregation::Avg, MetricKind::Distribution) => series.mean(),
            (Aggregation::Min, MetricKind::Distribution) => series.min(),
            (Aggregation::Max, MetricKind::Distribution) => series.max(),
            (Aggregation::Med, MetricKind::Distribution) => series.percentile(50.0),
            (Aggregation::Percentile(p), MetricKind::Distribution) => series.percentile(*p),
            _ => None,
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Count => write!(f, "count"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, value: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => value < bound,
            Comparison::Le => value <= bound,
            Comparison::Gt => value > bound,
            Comparison::Ge => value >= bound,
            Comparison::Eq => value == bound,
            Comparison::Ne => value != bound,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ThresholdParseError {
    #[error("threshold [{0}] has no comparison operator, expected one of <, <=, >, >=, ==, !=")]
    MissingOperator(String),
    #[error("threshold [{0}] uses an unknown aggregation, expected rate, count, avg, min, max, med or p(N)")]
    UnknownAggregation(String),
    #[error("threshold [{0}] has a percentile outside 0..=100")]
    InvalidPercentile(String),
    #[error("threshold [{0}] must compare against a number")]
    InvalidBound(String),
}

/// A parsed threshold predicate such as `p(95)<250` or `rate<0.1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op_start = s
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| ThresholdParseError::MissingOperator(s.to_string()))?;
        let (lhs, rest) = s.split_at(op_start);

        let (comparison, rhs) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .into_iter()
        .find_map(|(token, comparison)| rest.strip_prefix(token).map(|rhs| (comparison, rhs)))
        .ok_or_else(|| ThresholdParseError::MissingOperator(s.to_string()))?;

        let aggregation = match lhs.trim() {
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            other => {
                let p = other
                    .strip_prefix("p(")
                    .and_then(|p| p.strip_suffix(')'))
                    .ok_or_else(|| ThresholdParseError::UnknownAggregation(s.to_string()))?
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ThresholdParseError::InvalidPercentile(s.to_string()))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(ThresholdParseError::InvalidPercentile(s.to_string()));
                }
                Aggregation::Percentile(p)
            }
        };

        let bound = rhs
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or_else(|| ThresholdParseError::InvalidBound(s.to_string()))?;

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }
}

/// What a rule concludes when its metric received no observations during the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoDataPolicy {
    /// The rule fails with a "no data" reason.
    #[default]
    Fail,
    /// The rule passes vacuously. Use for metrics that legitimately may not be observed, such as
    /// a series only recorded on a rare code path.
    Pass,
}

/// A threshold configured for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    /// The expression as written, kept for reporting
    pub source: String,
    pub expr: ThresholdExpr,
    pub no_data: NoDataPolicy,
}

impl ThresholdRule {
    pub fn parse(
        metric: &str,
        source: &str,
        no_data: NoDataPolicy,
    ) -> Result<Self, ThresholdParseError> {
        Ok(Self {
            metric: metric.to_string(),
            source: source.trim().to_string(),
            expr: source.parse()?,
            no_data,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub rule: ThresholdRule,
    pub observed: Option<f64>,
    pub passed: bool,
    pub reason: Option<String>,
}

impl ThresholdResult {
    pub fn summary(&self) -> ThresholdSummary {
        ThresholdSummary {
            metric: self.rule.metric.clone(),
            expression: self.rule.source.clone(),
            observed: self.observed,
            passed: self.passed,
            reason: self.reason.clone(),
        }
    }
}

/// The verdict over every threshold rule of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunVerdict {
    pub results: Vec<ThresholdResult>,
}

impl RunVerdict {
    /// True if every rule passed. A run with no rules passes.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failed_rules(&self) -> impl Iterator<Item = &ThresholdRule> {
        self.results.iter().filter(|r| !r.passed).map(|r| &r.rule)
    }
}

/// Evaluate every rule against the final metrics of a run.
///
/// This is a pure function of its inputs, evaluating the same snapshot twice gives the same
/// verdict.
pub fn evaluate(rules: &[ThresholdRule], snapshot: &MetricsSnapshot) -> RunVerdict {
    let results = rules
        .iter()
        .map(|rule| evaluate_rule(rule, snapshot))
        .collect();

    RunVerdict { results }
}

fn evaluate_rule(rule: &ThresholdRule, snapshot: &MetricsSnapshot) -> ThresholdResult {
    let series = match snapshot.get(&rule.metric) {
        Some(series) if series.count() > 0 => series,
        _ => {
            let passed = rule.no_data == NoDataPolicy::Pass;
            if !passed {
                log::warn!(
                    "No data recorded for metric [{}], threshold [{}] fails",
                    rule.metric,
                    rule.source
                );
            }
            return ThresholdResult {
                rule: rule.clone(),
                observed: None,
                passed,
                reason: Some(if passed {
                    "no data, passing by configuration".to_string()
                } else {
                    "no data".to_string()
                }),
            };
        }
    };

    match rule.expr.aggregation.apply(series) {
        Some(observed) => ThresholdResult {
            rule: rule.clone(),
            observed: Some(observed),
            passed: rule.expr.comparison.holds(observed, rule.expr.bound),
            reason: None,
        },
        None => ThresholdResult {
            rule: rule.clone(),
            observed: None,
            passed: false,
            reason: Some(format!(
                "{} does not apply to a {} metric",
                rule.expr.aggregation,
                series.kind()
            )),
        },
    }
}

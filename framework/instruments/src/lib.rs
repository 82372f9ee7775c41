mod metrics;
mod outcome;
mod report;
mod snapshot;
mod threshold;

pub mod builtin {
    //! Names of the metric series that the harness records on its own.

    /// Latency of every request, in milliseconds.
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    /// Number of requests, read from the [HTTP_REQ_DURATION] series.
    pub const HTTP_REQS: &str = "http_reqs";
    /// True for every request that errored or returned a non-2xx status.
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    /// One observation per evaluated check, true when the check passed.
    pub const CHECKS: &str = "checks";
    /// Duration of one virtual user iteration excluding pacing, in milliseconds.
    pub const ITERATION_DURATION: &str = "iteration_duration";
}

pub use metrics::{DistributionMetric, MetricKind, MetricKindMismatch, MetricsAggregator, RateMetric};
pub use outcome::{Check, CheckCondition, Outcome};
pub use report::{print_summary, render_summary};
pub use snapshot::{MetricsSnapshot, SeriesSnapshot};
pub use threshold::{
    evaluate, Aggregation, Comparison, NoDataPolicy, RunVerdict, ThresholdExpr,
    ThresholdParseError, ThresholdResult, ThresholdRule,
};

mod tables;

use std::fmt::Write;

use stampede_summary_model::{MetricSummary, RunSummary};
use tabled::settings::Style;
use tabled::Table;

use crate::report::tables::{CheckRow, DistributionRow, RateRow, ThresholdRow};

/// Print the end of run report to stdout.
pub fn print_summary(summary: &RunSummary) {
    println!("{}", render_summary(summary));
}

/// Render the end of run report: metric tables, check tallies, threshold results and the verdict.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "\nRun {} of [{}] finished in {:.2}s with a peak of {} VUs ({} started)",
        summary.run_id,
        summary.scenario_name,
        summary.run_duration_ms as f64 / 1000.0,
        summary.peak_vus,
        summary.vus_started,
    );
    if summary.interrupted {
        let _ = writeln!(
            out,
            "The run was interrupted, metrics only cover the part of the plan that was executed"
        );
    }

    let mut rates = Vec::new();
    let mut distributions = Vec::new();
    for (metric, metric_summary) in &summary.metrics {
        match *metric_summary {
            MetricSummary::Rate {
                passes,
                fails,
                rate,
            } => rates.push(RateRow {
                metric: metric.clone(),
                passes,
                fails,
                rate,
            }),
            MetricSummary::Distribution {
                count,
                min,
                max,
                avg,
                med,
                p90,
                p95,
                p99,
            } => distributions.push(DistributionRow {
                metric: metric.clone(),
                count,
                avg,
                min,
                med,
                p90,
                p95,
                p99,
                max,
            }),
        }
    }

    if !distributions.is_empty() {
        let _ = writeln!(out, "\nDistributions (ms)\n{}", modern(Table::new(distributions)));
    }
    if !rates.is_empty() {
        let _ = writeln!(out, "\nRates\n{}", modern(Table::new(rates)));
    }

    if !summary.checks.is_empty() {
        let rows = summary.checks.iter().map(|check| {
            let total = check.passes + check.fails;
            CheckRow {
                check: check.name.clone(),
                passes: check.passes,
                fails: check.fails,
                pass_rate: if total > 0 {
                    check.passes as f64 / total as f64
                } else {
                    0.0
                },
            }
        });
        let _ = writeln!(out, "\nChecks\n{}", modern(Table::new(rows)));
    }

    if !summary.thresholds.is_empty() {
        let rows = summary.thresholds.iter().map(|threshold| ThresholdRow {
            metric: threshold.metric.clone(),
            threshold: threshold.expression.clone(),
            observed: threshold.observed,
            result: if threshold.passed { "✓ pass" } else { "✗ fail" },
            reason: threshold.reason.clone(),
        });
        let _ = writeln!(out, "\nThresholds\n{}", modern(Table::new(rows)));
    }

    if let Some(teardown_error) = &summary.teardown_error {
        let _ = writeln!(out, "\nTeardown failed: {teardown_error}");
    }

    let verdict = if summary.passed {
        "PASSED: all thresholds met"
    } else {
        "FAILED: one or more thresholds were not met"
    };
    let _ = writeln!(out, "\n{verdict}");

    out
}

fn modern(mut table: Table) -> Table {
    table.with(Style::modern());
    table
}

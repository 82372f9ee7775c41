use std::process::ExitCode;

use stampede_instruments::RunVerdict;
use stampede_summary_model::RunSummary;

use crate::plan::PlanError;

/// Setup succeeded and every threshold passed.
pub const EXIT_PASSED: u8 = 0;
/// The run completed but one or more thresholds failed.
pub const EXIT_THRESHOLDS_FAILED: u8 = 99;
/// Setup failed, no load was generated.
pub const EXIT_SETUP_FAILED: u8 = 98;
/// The plan was invalid or the runner itself failed.
pub const EXIT_INTERNAL_ERROR: u8 = 97;

/// Why a run did not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid run plan: {0}")]
    InvalidPlan(#[from] PlanError),
    #[error("setup failed: {0:#}")]
    Setup(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Setup(_) => EXIT_SETUP_FAILED,
            RunError::InvalidPlan(_) | RunError::Internal(_) => EXIT_INTERNAL_ERROR,
        }
    }
}

/// The outcome of a run that got as far as evaluating its thresholds.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub verdict: RunVerdict,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }

    pub fn exit_code(&self) -> u8 {
        if self.passed() {
            EXIT_PASSED
        } else {
            EXIT_THRESHOLDS_FAILED
        }
    }
}

/// Map the result of [crate::run::run] to the process exit status, logging the error if there
/// is one.
pub fn exit_code(result: &Result<RunReport, RunError>) -> ExitCode {
    let code = match result {
        Ok(report) => report.exit_code(),
        Err(e) => {
            log::error!("{e}");
            e.exit_code()
        }
    };
    ExitCode::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stampede_instruments::{
        evaluate, MetricsSnapshot, NoDataPolicy, SeriesSnapshot, ThresholdRule,
    };
    use std::collections::BTreeMap;

    fn report(failure_rate: (u64, u64)) -> RunReport {
        let snapshot = MetricsSnapshot::new(
            BTreeMap::from([(
                "http_req_failed".to_string(),
                SeriesSnapshot::Rate {
                    passes: failure_rate.0,
                    fails: failure_rate.1,
                },
            )]),
            Vec::new(),
        );
        let rules =
            vec![ThresholdRule::parse("http_req_failed", "rate<0.1", NoDataPolicy::Fail).unwrap()];

        RunReport {
            verdict: evaluate(&rules, &snapshot),
            summary: RunSummary::new(
                "id".to_string(),
                "exit_test".to_string(),
                0,
                Vec::new(),
                BTreeMap::new(),
                "0.1.0".to_string(),
            ),
        }
    }

    #[test]
    fn verdict_decides_the_code() {
        assert_eq!(EXIT_PASSED, report((0, 10)).exit_code());
        assert_eq!(EXIT_THRESHOLDS_FAILED, report((10, 0)).exit_code());
    }

    #[test]
    fn errors_have_distinct_codes() {
        assert_eq!(
            EXIT_SETUP_FAILED,
            RunError::Setup(anyhow::anyhow!("login refused")).exit_code()
        );
        assert_eq!(
            EXIT_INTERNAL_ERROR,
            RunError::InvalidPlan(PlanError::NoStages).exit_code()
        );
        assert_eq!(
            EXIT_INTERNAL_ERROR,
            RunError::Internal(anyhow::anyhow!("no runtime")).exit_code()
        );
    }

    #[test]
    fn setup_error_message_keeps_the_cause() {
        let err = RunError::Setup(
            anyhow::anyhow!("connection refused").context("login request failed"),
        );
        assert_eq!(
            "setup failed: login request failed: connection refused",
            err.to_string()
        );
    }
}

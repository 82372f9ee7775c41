mod cli;
mod config;
mod context;
mod definition;
mod dispatch;
mod executor;
mod exit;
mod init;
mod monitor;
mod plan;
mod progress;
mod run;
mod schedule;
mod shutdown;
mod types;
mod vu;

pub mod prelude {
    pub use crate::cli::StampedeScenarioCli;
    pub use crate::config::{parse_duration, RunConfig};
    pub use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, ScenarioAction, ScenarioDefinitionBuilder};
    pub use crate::dispatch::ScenarioDispatcher;
    pub use crate::executor::Executor;
    pub use crate::exit::{
        exit_code, RunError, RunReport, EXIT_INTERNAL_ERROR, EXIT_PASSED, EXIT_SETUP_FAILED,
        EXIT_THRESHOLDS_FAILED,
    };
    pub use crate::init::init;
    pub use crate::plan::{PlanError, RunPlan};
    pub use crate::run::run;
    pub use crate::schedule::{Stage, StagePlan};
    pub use crate::types::StampedeResult;

    pub use stampede_core::prelude::*;
    pub use stampede_instruments::{builtin, Check, MetricsAggregator, NoDataPolicy, Outcome};
}

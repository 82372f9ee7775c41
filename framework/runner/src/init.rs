use crate::cli::StampedeScenarioCli;
use clap::Parser;

/// Initialise the CLI and logging for the Stampede runner.
pub fn init() -> StampedeScenarioCli {
    env_logger::init();

    StampedeScenarioCli::parse()
}

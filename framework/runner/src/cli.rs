use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(about, long_about = None)]
pub struct StampedeScenarioCli {
    /// Path to a TOML run configuration.
    ///
    /// Values in the file override the defaults built into the scenario. Flags on the command line
    /// override the file.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL of the service to test, for example `http://localhost:8001`
    #[clap(long, env = "STAMPEDE_BASE_URL")]
    pub base_url: Option<String>,

    /// Run a flat load with this many virtual users instead of the configured stages.
    ///
    /// Must be used together with `--duration`.
    #[clap(long, requires = "duration")]
    pub vus: Option<u32>,

    /// How long to run the flat load started with `--vus`, for example `30s` or `2m`
    #[clap(long, requires = "vus")]
    pub duration: Option<String>,

    /// Seed for scenario selection, so that the sequence of scenarios each virtual user runs can
    /// be reproduced
    #[clap(long)]
    pub seed: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Write the run summary as JSON to this path once the run has finished
    #[clap(long)]
    pub summary_out: Option<PathBuf>,

    /// Use this run id instead of a generated one
    #[clap(long)]
    pub run_id: Option<String>,
}

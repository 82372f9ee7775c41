use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::Path;

/// Final summary of a single metric series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSummary {
    /// A series of true/false observations.
    Rate {
        /// Number of `true` observations
        passes: u64,
        /// Number of `false` observations
        fails: u64,
        /// Fraction of observations that were `true`, 0 when there were no observations
        rate: f64,
    },
    /// A series of observed values, latencies in milliseconds for the built-in series.
    Distribution {
        count: u64,
        min: f64,
        max: f64,
        avg: f64,
        med: f64,
        p90: f64,
        p95: f64,
        p99: f64,
    },
}

impl MetricSummary {
    /// The number of observations that went into this summary.
    pub fn count(&self) -> u64 {
        match self {
            MetricSummary::Rate { passes, fails, .. } => passes + fails,
            MetricSummary::Distribution { count, .. } => *count,
        }
    }
}

/// Pass/fail tally for a named check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Outcome of one threshold rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    /// The metric the rule applies to
    pub metric: String,
    /// The rule as it was written in the configuration, for example `p(95)<250`
    pub expression: String,
    /// The aggregated value the rule was checked against
    ///
    /// Not set if the metric had no data or the aggregation does not apply to the metric.
    pub observed: Option<f64>,
    pub passed: bool,
    /// Why the rule did not produce a plain comparison, such as missing data
    pub reason: Option<String>,
}

/// A stage as it was planned for the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSummary {
    pub duration_ms: u64,
    pub target: u32,
}

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario definition that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The stages the run was planned with
    pub stages: Vec<StageSummary>,
    /// The relative weight of each scenario
    pub scenario_weights: BTreeMap<String, f64>,
    /// How long the run actually took, in milliseconds, from the first scheduler tick until the
    /// last virtual user drained
    pub run_duration_ms: u64,
    /// Whether the run was stopped early, by Ctrl-C or by a scenario forcing a stop
    ///
    /// The metrics of an interrupted run only cover the part of the plan that was executed.
    pub interrupted: bool,
    /// The highest number of virtual users running at the same time
    pub peak_vus: usize,
    /// The number of virtual users started over the whole run
    pub vus_started: usize,
    /// Final aggregate of every metric series observed during the run
    pub metrics: BTreeMap<String, MetricSummary>,
    /// Pass/fail tallies for every named check
    pub checks: Vec<CheckSummary>,
    /// The outcome of every configured threshold rule
    pub thresholds: Vec<ThresholdSummary>,
    /// True if every threshold rule passed
    pub passed: bool,
    /// Set if the teardown hook failed
    ///
    /// A teardown failure does not change [RunSummary::passed].
    pub teardown_error: Option<String>,
    /// Environment values relevant to the run, such as the target base URL
    pub env: HashMap<String, String>,
    /// The version of Stampede that produced this summary
    pub stampede_version: String,
}

impl RunSummary {
    /// Create a new run summary with no results recorded yet
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        stages: Vec<StageSummary>,
        scenario_weights: BTreeMap<String, f64>,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            stages,
            scenario_weights,
            run_duration_ms: 0,
            interrupted: false,
            peak_vus: 0,
            vus_started: 0,
            metrics: BTreeMap::new(),
            checks: Vec::new(),
            thresholds: Vec::new(),
            passed: false,
            teardown_error: None,
            env: HashMap::with_capacity(0),
            stampede_version,
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// The threshold rules that did not pass
    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdSummary> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to identify the configuration used for the run, so that runs of
    /// the same plan can be compared. It uses the
    ///     - Scenario name
    ///     - Stages
    ///     - Scenario weights
    ///     - Selected environment variables
    ///     - Stampede version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        for stage in &self.stages {
            Digest::update(&mut hasher, stage.duration_ms.to_le_bytes());
            Digest::update(&mut hasher, stage.target.to_le_bytes());
        }
        for (name, weight) in &self.scenario_weights {
            Digest::update(&mut hasher, name.as_bytes());
            Digest::update(&mut hasher, weight.to_le_bytes());
        }
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.stampede_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Write the run summary to a file as pretty printed JSON, replacing any existing content.
pub fn write_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

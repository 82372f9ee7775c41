use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use stampede_instruments::{NoDataPolicy, ThresholdParseError, ThresholdRule};
use url::Url;

use crate::cli::StampedeScenarioCli;
use crate::config::{parse_duration, RunConfig};
use crate::dispatch::ScenarioDispatcher;
use crate::schedule::{Stage, StagePlan};

/// Anything wrong with the plan of a run. These are all found before setup runs.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("could not read config file {path:?}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    ParseConfig(#[from] toml::de::Error),
    #[error("invalid duration [{0}], expected a number followed by ms, s, m or h")]
    InvalidDuration(String),
    #[error("the plan has no stages")]
    NoStages,
    #[error("stage {index} has a zero duration")]
    ZeroDuration { index: usize },
    #[error("the stages add up to more than the longest allowed run of {max:?}")]
    RunTooLong { max: Duration },
    #[error("the plan has no scenarios")]
    NoScenarios,
    #[error("scenario [{0}] is defined more than once")]
    DuplicateScenario(String),
    #[error("scenario [{name}] has weight {weight}, weights must be positive")]
    InvalidWeight { name: String, weight: f64 },
    #[error("the scenario weights add up to more than can be represented")]
    TotalWeightOverflow,
    #[error("scenario [{0}] is not defined by this test")]
    UnknownScenario(String),
    #[error("invalid threshold [{source_expr}] for metric [{metric}]: {source}")]
    InvalidThreshold {
        metric: String,
        source_expr: String,
        source: ThresholdParseError,
    },
    #[error("invalid base URL [{url}]: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("no base URL, set one with --base-url, STAMPEDE_BASE_URL or the config file")]
    MissingBaseUrl,
    #[error("the tick interval must be greater than zero")]
    ZeroTickInterval,
}

/// A scenario that is part of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub name: String,
    pub weight: f64,
    /// Overrides the plan's pacing delay for this scenario.
    pub pacing: Option<Duration>,
}

/// The values a scenario supplies in code. Config and CLI values are layered on top.
#[derive(Debug, Clone)]
pub struct PlanDefaults {
    pub start_vus: u32,
    pub stages: Vec<Stage>,
    pub scenarios: Vec<ScenarioPlan>,
    pub thresholds: Vec<(String, String, NoDataPolicy)>,
    pub base_url: Option<String>,
    pub pacing: Duration,
    pub request_timeout: Duration,
    pub tick_interval: Duration,
    pub credentials: BTreeMap<String, String>,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            start_vus: 0,
            stages: Vec::new(),
            scenarios: Vec::new(),
            thresholds: Vec::new(),
            base_url: None,
            pacing: Duration::from_secs(1),
            request_timeout: Duration::from_secs(60),
            tick_interval: Duration::from_secs(1),
            credentials: BTreeMap::new(),
        }
    }
}

/// Everything a run needs to know before it starts. Read-only once built.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub stages: StagePlan,
    pub scenarios: Vec<ScenarioPlan>,
    pub thresholds: Vec<ThresholdRule>,
    pub base_url: Url,
    pub pacing: Duration,
    pub request_timeout: Duration,
    pub tick_interval: Duration,
    pub seed: Option<u64>,
    pub credentials: BTreeMap<String, String>,
}

impl RunPlan {
    /// Layer the config file and the command line over the scenario defaults and validate the
    /// result.
    ///
    /// Precedence, highest first: command line, environment credentials, config file, defaults.
    pub fn resolve(
        defaults: PlanDefaults,
        config: RunConfig,
        cli: &StampedeScenarioCli,
        env_credentials: BTreeMap<String, String>,
    ) -> Result<Self, PlanError> {
        let stages = match (cli.vus, cli.duration.as_deref()) {
            (Some(vus), Some(duration)) => {
                StagePlan::new(vus, vec![Stage::new(parse_duration(duration)?, vus)])?
            }
            _ if !config.stages.is_empty() => StagePlan::new(
                config.start_vus.unwrap_or(defaults.start_vus),
                config
                    .stages
                    .iter()
                    .map(|s| Ok(Stage::new(parse_duration(&s.duration)?, s.target)))
                    .collect::<Result<_, PlanError>>()?,
            )?,
            _ => StagePlan::new(
                config.start_vus.unwrap_or(defaults.start_vus),
                defaults.stages,
            )?,
        };

        let scenarios = if config.scenarios.is_empty() {
            defaults.scenarios
        } else {
            let defined: HashMap<_, _> = defaults
                .scenarios
                .iter()
                .map(|s| (s.name.as_str(), s))
                .collect();
            config
                .scenarios
                .iter()
                .map(|s| {
                    let default = defined
                        .get(s.name.as_str())
                        .ok_or_else(|| PlanError::UnknownScenario(s.name.clone()))?;
                    Ok(ScenarioPlan {
                        name: s.name.clone(),
                        weight: s.weight,
                        pacing: match &s.pacing_delay {
                            Some(pacing) => Some(parse_duration(pacing)?),
                            None => default.pacing,
                        },
                    })
                })
                .collect::<Result<Vec<_>, PlanError>>()?
        };
        ScenarioDispatcher::new(
            scenarios
                .iter()
                .map(|s| (s.name.clone(), s.weight, ()))
                .collect(),
        )?;

        let thresholds = resolve_thresholds(defaults.thresholds, &config)?;

        let base_url = cli
            .base_url
            .clone()
            .or(config.base_url)
            .or(defaults.base_url)
            .ok_or(PlanError::MissingBaseUrl)?;
        let base_url = Url::parse(&base_url).map_err(|e| PlanError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PlanError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let optional_duration = |value: &Option<String>| value.as_deref().map(parse_duration).transpose();
        let pacing = optional_duration(&config.pacing_delay)?.unwrap_or(defaults.pacing);
        let request_timeout =
            optional_duration(&config.request_timeout)?.unwrap_or(defaults.request_timeout);
        let tick_interval =
            optional_duration(&config.tick_interval)?.unwrap_or(defaults.tick_interval);
        if tick_interval.is_zero() {
            return Err(PlanError::ZeroTickInterval);
        }

        let mut credentials = defaults.credentials;
        credentials.extend(config.credentials);
        credentials.extend(env_credentials);

        Ok(Self {
            stages,
            scenarios,
            thresholds,
            base_url,
            pacing,
            request_timeout,
            tick_interval,
            seed: cli.seed.or(config.seed),
            credentials,
        })
    }

    /// The pacing delay that applies after an iteration of `scenario`.
    pub fn pacing_for(&self, scenario: &str) -> Duration {
        self.scenarios
            .iter()
            .find(|s| s.name == scenario)
            .and_then(|s| s.pacing)
            .unwrap_or(self.pacing)
    }
}

/// Thresholds from the config file replace the defaults of the same metric.
fn resolve_thresholds(
    defaults: Vec<(String, String, NoDataPolicy)>,
    config: &RunConfig,
) -> Result<Vec<ThresholdRule>, PlanError> {
    let from_config = config.thresholds.iter().flat_map(|(metric, thresholds)| {
        thresholds
            .iter()
            .map(move |t| (metric.clone(), t.expr().to_string(), t.no_data()))
    });

    defaults
        .into_iter()
        .filter(|(metric, _, _)| !config.thresholds.contains_key(metric))
        .chain(from_config)
        .map(|(metric, source, no_data)| {
            ThresholdRule::parse(&metric, &source, no_data).map_err(|source_err| {
                PlanError::InvalidThreshold {
                    metric,
                    source_expr: source,
                    source: source_err,
                }
            })
        })
        .collect()
}

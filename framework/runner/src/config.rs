use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use stampede_instruments::NoDataPolicy;

use crate::plan::PlanError;

/// Prefix of environment variables that supply credentials, `STAMPEDE_CREDENTIAL_PASSWORD` sets
/// the `password` credential.
pub const CREDENTIAL_ENV_PREFIX: &str = "STAMPEDE_CREDENTIAL_";

/// The contents of a TOML run configuration file.
///
/// Every field is optional, anything not set falls back to the defaults of the scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub base_url: Option<String>,
    pub pacing_delay: Option<String>,
    pub request_timeout: Option<String>,
    pub start_vus: Option<u32>,
    pub tick_interval: Option<String>,
    pub seed: Option<u64>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdConfig>>,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub duration: String,
    #[serde(alias = "target_vus")]
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,
    pub weight: f64,
    pub pacing_delay: Option<String>,
}

/// A threshold is either a bare expression or an expression with its no-data policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ThresholdConfig {
    Expr(String),
    Detailed {
        expr: String,
        #[serde(default)]
        no_data: NoDataPolicy,
    },
}

impl ThresholdConfig {
    pub fn expr(&self) -> &str {
        match self {
            ThresholdConfig::Expr(expr) => expr,
            ThresholdConfig::Detailed { expr, .. } => expr,
        }
    }

    pub fn no_data(&self) -> NoDataPolicy {
        match self {
            ThresholdConfig::Expr(_) => NoDataPolicy::default(),
            ThresholdConfig::Detailed { no_data, .. } => *no_data,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let content = std::fs::read_to_string(path).map_err(|source| PlanError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(content)?)
    }
}

/// Parse a human duration such as `250ms`, `1.5s`, `2m` or `1h`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, PlanError> {
    let invalid = || PlanError::InvalidDuration(input.to_string());

    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(invalid()),
    };

    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

/// Pick the credentials out of a set of environment variables.
///
/// Keys are lower-cased after the prefix is removed.
pub fn credentials_from_env(
    vars: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(CREDENTIAL_ENV_PREFIX)
                .filter(|k| !k.is_empty())
                .map(|k| (k.to_lowercase(), value))
        })
        .collect()
}

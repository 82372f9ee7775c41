use std::time::Duration;

/// What a check asserts about a request attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckCondition {
    /// The response status equals this code.
    Status(u16),
    /// The response status is anything but this code.
    StatusNot(u16),
    /// The response status is strictly below this code.
    StatusBelow(u16),
    /// The server produced a response at all.
    Responded,
    /// The request completed in strictly less than this time.
    LatencyBelow(Duration),
}

/// A named assertion over the status and latency of a request attempt.
///
/// An attempt that never got a response is treated as having status 0, so `StatusNot(500)` and
/// `StatusBelow(500)` pass for it while `Responded` does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    name: String,
    condition: CheckCondition,
}

impl Check {
    pub fn new(name: impl Into<String>, condition: CheckCondition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }

    pub fn status_is(name: impl Into<String>, status: u16) -> Self {
        Self::new(name, CheckCondition::Status(status))
    }

    pub fn status_is_not(name: impl Into<String>, status: u16) -> Self {
        Self::new(name, CheckCondition::StatusNot(status))
    }

    pub fn status_below(name: impl Into<String>, status: u16) -> Self {
        Self::new(name, CheckCondition::StatusBelow(status))
    }

    pub fn responded(name: impl Into<String>) -> Self {
        Self::new(name, CheckCondition::Responded)
    }

    pub fn latency_below(name: impl Into<String>, bound: Duration) -> Self {
        Self::new(name, CheckCondition::LatencyBelow(bound))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, status: Option<u16>, latency: Duration) -> bool {
        let status = status.unwrap_or(0);
        match self.condition {
            CheckCondition::Status(expected) => status == expected,
            CheckCondition::StatusNot(unexpected) => status != unexpected,
            CheckCondition::StatusBelow(bound) => status < bound,
            CheckCondition::Responded => status != 0,
            CheckCondition::LatencyBelow(bound) => latency < bound,
        }
    }
}

/// The result of one request attempt.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Label for the request, used in logs
    pub name: String,
    /// The response status, or `None` if the request failed before a response arrived
    pub status: Option<u16>,
    /// Time from dispatch until the full body was read or the request failed
    pub latency: Duration,
    /// The transport error, if the request failed
    pub error: Option<String>,
    /// The response body, if one was read
    pub body: Option<String>,
    check_results: Vec<(String, bool)>,
}

impl Outcome {
    pub fn new(name: impl Into<String>, status: Option<u16>, latency: Duration) -> Self {
        Self {
            name: name.into(),
            status,
            latency,
            error: None,
            body: None,
            check_results: Vec::new(),
        }
    }

    /// An attempt that failed without a response.
    pub fn failed(name: impl Into<String>, latency: Duration, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(name, None, latency)
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Evaluate the checks against this attempt and keep their results.
    pub fn with_checks(mut self, checks: &[Check]) -> Self {
        let (status, latency) = (self.status, self.latency);
        self.check_results.extend(
            checks
                .iter()
                .map(|check| (check.name().to_string(), check.evaluate(status, latency))),
        );
        self
    }

    pub fn check_results(&self) -> &[(String, bool)] {
        &self.check_results
    }

    /// True if every check evaluated for this attempt passed.
    pub fn checks_passed(&self) -> bool {
        self.check_results.iter().all(|(_, passed)| *passed)
    }

    /// True if the attempt errored or the status was not 2xx.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !matches!(self.status, Some(200..=299))
    }

    /// Deserialize the response body as JSON, `None` if there is no body or it doesn't match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        let body = self.body.as_deref()?;
        match serde_json::from_str(body) {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Response body for [{}] is not the expected JSON: {e}", self.name);
                None
            }
        }
    }
}

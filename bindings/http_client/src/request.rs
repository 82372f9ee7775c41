use std::sync::Arc;
use std::time::Instant;

use reqwest::RequestBuilder;
use serde::Serialize;
use stampede_instruments::{Check, MetricsAggregator, Outcome};

/// A request that will be timed, checked and recorded when it is sent.
#[derive(Debug)]
pub struct InstrumentedRequest {
    name: String,
    builder: anyhow::Result<RequestBuilder>,
    checks: Vec<Check>,
    metrics: Arc<MetricsAggregator>,
}

impl InstrumentedRequest {
    pub(crate) fn new(
        name: String,
        builder: anyhow::Result<RequestBuilder>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            name,
            builder,
            checks: Vec::new(),
            metrics,
        }
    }

    fn map(mut self, f: impl FnOnce(RequestBuilder) -> RequestBuilder) -> Self {
        self.builder = self.builder.map(f);
        self
    }

    /// Label the request in logs, for example `list products`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.map(|b| b.bearer_auth(token))
    }

    pub fn header(self, key: &str, value: &str) -> Self {
        self.map(|b| b.header(key, value))
    }

    pub fn query<T: Serialize + ?Sized>(self, query: &T) -> Self {
        self.map(|b| b.query(query))
    }

    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.map(|b| b.json(json))
    }

    pub fn form<T: Serialize + ?Sized>(self, form: &T) -> Self {
        self.map(|b| b.form(form))
    }

    pub fn body(self, body: impl Into<reqwest::Body>) -> Self {
        self.map(|b| b.body(body))
    }

    /// Evaluate `check` against the response once it arrives.
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }

    /// Send the request and read the full response body.
    ///
    /// Never fails: transport errors, timeouts and error statuses all come back as an [Outcome]
    /// that is recorded as a failed request.
    pub async fn send(self) -> Outcome {
        let started = Instant::now();

        let outcome = match self.builder {
            Ok(builder) => match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match response.text().await {
                        Ok(body) => {
                            Outcome::new(&self.name, Some(status), started.elapsed()).with_body(body)
                        }
                        Err(e) => {
                            let mut outcome =
                                Outcome::new(&self.name, Some(status), started.elapsed());
                            outcome.error = Some(format!("{:#}", anyhow::Error::from(e)));
                            outcome
                        }
                    }
                }
                Err(e) => Outcome::failed(
                    &self.name,
                    started.elapsed(),
                    format!("{:#}", anyhow::Error::from(e)),
                ),
            },
            Err(e) => Outcome::failed(&self.name, started.elapsed(), format!("{e:#}")),
        }
        .with_checks(&self.checks);

        if outcome.is_failure() {
            log::debug!(
                "Request [{}] failed after {:?} with status {:?}: {}",
                outcome.name,
                outcome.latency,
                outcome.status,
                outcome.error.as_deref().unwrap_or("unexpected status")
            );
        }
        self.metrics.record_outcome(&outcome);

        outcome
    }
}

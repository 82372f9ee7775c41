use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use stampede_instruments::MetricsAggregator;
use url::Url;

use crate::request::InstrumentedRequest;

/// An HTTP client that records every request it sends in the run's metrics.
///
/// Cheap to clone, clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    client: reqwest::Client,
    base_url: Url,
    metrics: Arc<MetricsAggregator>,
}

impl HttpClientInstrumented {
    /// Build a client for the service at `base_url`. Requests that take longer than `timeout` are
    /// recorded as failures.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        metrics: Arc<MetricsAggregator>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stampede/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            metrics,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn get(&self, path: &str) -> InstrumentedRequest {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> InstrumentedRequest {
        self.request(Method::POST, path)
    }

    /// Start a request to `path`, resolved against the base URL. The request is named after its
    /// method and path unless renamed with [InstrumentedRequest::name].
    pub fn request(&self, method: Method, path: &str) -> InstrumentedRequest {
        let name = format!("{method} {path}");
        let builder = self
            .base_url
            .join(path)
            .with_context(|| format!("Invalid request path [{path}]"))
            .map(|url| self.client.request(method, url));

        InstrumentedRequest::new(name, builder, self.metrics.clone())
    }
}

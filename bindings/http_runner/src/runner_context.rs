use std::sync::Arc;

use anyhow::Context;

use stampede_http_client::prelude::HttpClientInstrumented;
use stampede_runner::prelude::UserValuesConstraint;

/// Values shared by every virtual user of an HTTP scenario, filled in by setup.
#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    client: Option<Arc<HttpClientInstrumented>>,
    token: Option<String>,
}

impl UserValuesConstraint for HttpRunnerContext {}

impl HttpRunnerContext {
    /// The client created by [crate::common::configure_http_client].
    pub fn client(&self) -> anyhow::Result<&HttpClientInstrumented> {
        self.client
            .as_deref()
            .context("No HTTP client, call configure_http_client in setup")
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn set_client(&mut self, client: HttpClientInstrumented) {
        self.client = Some(Arc::new(client));
    }

    pub(crate) fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }
}

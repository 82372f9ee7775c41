use anyhow::{bail, Context};
use serde::Deserialize;
use stampede_http_client::prelude::{Check, HttpClientInstrumented, InstrumentedRequest};
use stampede_runner::prelude::{HookResult, RunnerContext, StampedeResult, VuContext};

use crate::runner_context::HttpRunnerContext;

/// Creates the shared [HttpClientInstrumented] for the run and stores it in [HttpRunnerContext].
///
/// The client targets the run's base URL and records every request in the run's metrics. Call this
/// first in your setup hook:
/// ```rust
/// use stampede_http_runner::prelude::{configure_http_client, HookResult, HttpRunnerContext, RunnerContext};
///
/// fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
///     configure_http_client(ctx)?;
///     Ok(())
/// }
/// ```
pub fn configure_http_client(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let client = HttpClientInstrumented::new(
        ctx.base_url().clone(),
        ctx.request_timeout(),
        ctx.metrics().clone(),
    )?;
    log::debug!("Configured HTTP client for {}", client.base_url());

    ctx.get_mut().set_client(client);

    Ok(())
}

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Logs in once for the whole run and stores the access token in [HttpRunnerContext].
///
/// Method:
/// - Reads the `username` and `password` credentials of the run.
/// - Posts them as a form to `path`.
/// - Expects a 200 response with an `access_token` field in its JSON body.
///
/// Any other outcome is an error, which fails setup so that no load is generated against a service
/// that would reject every request.
pub fn login(ctx: &mut RunnerContext<HttpRunnerContext>, path: &str) -> HookResult {
    let username = ctx
        .credential("username")
        .context("Missing the username credential")?
        .to_string();
    let password = ctx
        .credential("password")
        .context("Missing the password credential")?
        .to_string();
    let client = ctx.get().client()?.clone();
    let path = path.to_string();

    let token = ctx.executor().execute_in_place(async move {
        let outcome = client
            .post(&path)
            .name("login")
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .check(Check::status_is("login succeeded", 200))
            .send()
            .await;

        if let Some(error) = outcome.error.as_deref() {
            bail!("Login request to [{path}] failed: {error}");
        }
        if outcome.status != Some(200) {
            bail!(
                "Login to [{path}] was rejected with status {}",
                outcome.status.unwrap_or_default()
            );
        }

        outcome
            .json::<LoginResponse>()
            .map(|r| r.access_token)
            .with_context(|| format!("Login response from [{path}] has no access token"))
    })?;

    log::info!("Logged in as {}", ctx.credential("username").unwrap_or_default());
    ctx.get_mut().set_token(token);

    Ok(())
}

/// A GET request to `path`, authorized with the run's access token if there is one.
pub fn api_get(ctx: &VuContext<HttpRunnerContext>, path: &str) -> StampedeResult<InstrumentedRequest> {
    Ok(authorize(ctx, ctx.get().client()?.get(path)))
}

/// A POST request to `path`, authorized with the run's access token if there is one.
pub fn api_post(ctx: &VuContext<HttpRunnerContext>, path: &str) -> StampedeResult<InstrumentedRequest> {
    Ok(authorize(ctx, ctx.get().client()?.post(path)))
}

fn authorize(ctx: &VuContext<HttpRunnerContext>, request: InstrumentedRequest) -> InstrumentedRequest {
    match ctx.get().token() {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

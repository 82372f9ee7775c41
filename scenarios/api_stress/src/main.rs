use std::process::ExitCode;
use std::time::Duration;

use stampede_http_runner::prelude::*;

const ERRORS: &str = "errors";

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_client(ctx)?;
    Ok(())
}

/// Hit one endpoint and check that the service is neither erroring nor stalling.
async fn probe(ctx: VuContext<HttpRunnerContext>, path: &'static str) -> HookResult {
    let outcome = ctx
        .get()
        .client()?
        .get(path)
        .check(Check::status_is_not("status is not 500", 500))
        .check(Check::latency_below(
            "response time < 2s",
            Duration::from_secs(2),
        ))
        .send()
        .await;

    ctx.metrics().rate(ERRORS)?.add(!outcome.checks_passed());

    Ok(())
}

fn main() -> ExitCode {
    // Every endpoint is equally likely on each iteration.
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext>::new_with_init(env!("CARGO_PKG_NAME"))
            .with_default_base_url("http://localhost:8001")
            .with_default_stage(Duration::from_secs(60), 100)
            .with_default_stage(Duration::from_secs(3 * 60), 500)
            .with_default_stage(Duration::from_secs(2 * 60), 1000)
            .with_default_stage(Duration::from_secs(2 * 60), 100)
            .with_default_stage(Duration::from_secs(60), 0)
            .with_default_pacing(Duration::from_millis(500))
            .with_default_threshold(builtin::HTTP_REQ_DURATION, "p(95)<1000")
            .with_default_threshold(builtin::HTTP_REQ_FAILED, "rate<0.2")
            .with_default_threshold(ERRORS, "rate<0.2")
            .use_setup(setup)
            .use_named_scenario("healthz", 1.0, |ctx| probe(ctx, "/healthz"))
            .use_named_scenario("products", 1.0, |ctx| probe(ctx, "/products/"))
            .use_named_scenario("materials", 1.0, |ctx| probe(ctx, "/materials/"))
            .use_named_scenario("fees", 1.0, |ctx| {
                probe(ctx, "/fees/calculate?products=1,2,3")
            });

    exit_code(&run(builder))
}

use std::process::ExitCode;
use std::time::Duration;

use stampede_http_runner::prelude::*;

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_client(ctx)?;
    Ok(())
}

async fn healthcheck(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let outcome = ctx
        .get()
        .client()?
        .get("/healthz")
        .check(Check::responded("healthcheck responds"))
        .check(Check::status_below("not server error", 500))
        .send()
        .await;

    ctx.metrics().rate("errors")?.add(!outcome.checks_passed());

    Ok(())
}

fn main() -> ExitCode {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext>::new_with_init(env!("CARGO_PKG_NAME"))
            .with_default_base_url("http://localhost:8001")
            .with_default_stages(vec![
                // Normal load
                Stage::new(Duration::from_secs(30), 50),
                // Sudden spike, then hold it
                Stage::new(Duration::from_secs(10), 2000),
                Stage::new(Duration::from_secs(30), 2000),
                // Back to normal, then ramp down
                Stage::new(Duration::from_secs(10), 50),
                Stage::new(Duration::from_secs(30), 50),
                Stage::new(Duration::from_secs(10), 0),
            ])
            .with_default_pacing(Duration::from_millis(100))
            // Higher latency and failure rates are tolerated during the spike.
            .with_default_threshold(builtin::HTTP_REQ_DURATION, "p(95)<2000")
            .with_default_threshold(builtin::HTTP_REQ_FAILED, "rate<0.3")
            .use_setup(setup)
            .use_scenario(healthcheck);

    exit_code(&run(builder))
}

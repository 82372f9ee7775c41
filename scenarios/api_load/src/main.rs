use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use stampede_http_runner::prelude::*;

/// Rate of request groups where at least one check failed.
const ERRORS: &str = "errors";

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_client(ctx)?;
    login(ctx, "/auth/login")?;
    Ok(())
}

fn teardown(ctx: Arc<RunnerContext<HttpRunnerContext>>) -> HookResult {
    log::info!("Load test {} completed", ctx.run_id());
    Ok(())
}

fn record_errors(ctx: &VuContext<HttpRunnerContext>, outcome: &Outcome) -> StampedeResult<()> {
    ctx.metrics().rate(ERRORS)?.add(!outcome.checks_passed());
    Ok(())
}

async fn healthcheck(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let outcome = ctx
        .get()
        .client()?
        .get("/healthz")
        .check(Check::status_is("health check status is 200", 200))
        .check(Check::latency_below(
            "health check response time < 100ms",
            Duration::from_millis(100),
        ))
        .send()
        .await;
    record_errors(&ctx, &outcome)
}

async fn products(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let list = api_get(&ctx, "/products/")?
        .name("list products")
        .check(Check::status_is("products list status is 200", 200))
        .check(Check::latency_below(
            "products list response time < 250ms",
            Duration::from_millis(250),
        ))
        .send()
        .await;
    record_errors(&ctx, &list)?;

    // Only create when the service is healthy enough to list.
    if list.status != Some(200) {
        return Ok(());
    }

    let product = {
        let mut rng = rand::thread_rng();
        json!({
            "name": format!("Load Test Product {}", rng.gen::<f64>()),
            "description": "Product created during load testing",
            "category": "Electronics",
            "weight": rng.gen_range(0.0..10.0),
            "material_composition": {
                "plastic": 70,
                "metal": 30
            }
        })
    };

    let created = api_post(&ctx, "/products/")?
        .name("create product")
        .json(&product)
        .check(Check::status_is("product creation status is 201", 201))
        .check(Check::latency_below(
            "product creation response time < 500ms",
            Duration::from_millis(500),
        ))
        .send()
        .await;
    record_errors(&ctx, &created)
}

async fn materials(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let outcome = api_get(&ctx, "/materials/")?
        .name("list materials")
        .check(Check::status_is("materials list status is 200", 200))
        .check(Check::latency_below(
            "materials list response time < 200ms",
            Duration::from_millis(200),
        ))
        .send()
        .await;
    record_errors(&ctx, &outcome)
}

async fn fees(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let outcome = api_get(&ctx, "/fees/calculate")?
        .name("calculate fees")
        .query(&[("products", "1,2,3"), ("period", "Q1-2024")])
        .check(Check::status_is("fee calculation status is 200", 200))
        .check(Check::latency_below(
            "fee calculation response time < 300ms",
            Duration::from_millis(300),
        ))
        .send()
        .await;
    record_errors(&ctx, &outcome)
}

async fn reports(ctx: VuContext<HttpRunnerContext>) -> HookResult {
    let list = api_get(&ctx, "/reports/")?
        .name("list reports")
        .check(Check::status_is("reports list status is 200", 200))
        .check(Check::latency_below(
            "reports list response time < 250ms",
            Duration::from_millis(250),
        ))
        .send()
        .await;
    record_errors(&ctx, &list)?;

    if list.status != Some(200) {
        return Ok(());
    }

    let generated = api_post(&ctx, "/reports/generate")?
        .name("generate report")
        .json(&json!({
            "title": format!("Load Test Report {}", chrono::Utc::now().timestamp_millis()),
            "type": "monthly",
            "start_date": "2024-01-01",
            "end_date": "2024-01-31"
        }))
        .check(Check::status_is("report generation status is 201", 201))
        .check(Check::latency_below(
            "report generation response time < 1000ms",
            Duration::from_millis(1000),
        ))
        .send()
        .await;
    record_errors(&ctx, &generated)
}

fn main() -> ExitCode {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext>::new_with_init(env!("CARGO_PKG_NAME"))
            .with_default_base_url("http://localhost:8001")
            .with_default_credential("username", "loadtest@example.com")
            .with_default_credential("password", "loadtestpassword123")
            // Ramp up to 50 users, up to 200 and hold there, then ramp down.
            .with_default_stage(Duration::from_secs(2 * 60), 50)
            .with_default_stage(Duration::from_secs(5 * 60), 200)
            .with_default_stage(Duration::from_secs(2 * 60), 0)
            .with_default_pacing(Duration::from_secs(1))
            .with_default_threshold(builtin::HTTP_REQ_DURATION, "p(95)<250")
            .with_default_threshold(builtin::HTTP_REQ_FAILED, "rate<0.1")
            .with_default_threshold(ERRORS, "rate<0.1")
            .use_setup(setup)
            .use_named_scenario("healthcheck", 10.0, healthcheck)
            .use_named_scenario("products", 30.0, products)
            .use_named_scenario("materials", 20.0, materials)
            .use_named_scenario("fees", 25.0, fees)
            .use_named_scenario("reports", 15.0, reports)
            .use_teardown(teardown);

    exit_code(&run(builder))
}

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Form;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use stampede_http_client::prelude::{Check, HttpClientInstrumented};
use stampede_instruments::{builtin, MetricsAggregator, SeriesSnapshot};
use url::Url;

#[derive(serde::Deserialize)]
struct Login {
    username: String,
    password: String,
}

async fn start_server() -> Url {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/fail",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        )
        .route(
            "/auth/login",
            post(|Form(login): Form<Login>| async move {
                if login.username == "loadtest@example.com" && login.password == "secret" {
                    Ok(Json(serde_json::json!({ "access_token": "token-123" })))
                } else {
                    Err(StatusCode::UNAUTHORIZED)
                }
            }),
        )
        .route(
            "/products/",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer token-123");
                if authorized {
                    (StatusCode::CREATED, Json(body))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(serde_json::Value::Null))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{addr}")).unwrap()
}

fn client(base_url: Url, timeout: Duration) -> (HttpClientInstrumented, Arc<MetricsAggregator>) {
    let metrics = Arc::new(MetricsAggregator::new());
    (
        HttpClientInstrumented::new(base_url, timeout, metrics.clone()).unwrap(),
        metrics,
    )
}

fn failure_counts(metrics: &MetricsAggregator) -> (u64, u64) {
    match metrics.snapshot().get(builtin::HTTP_REQ_FAILED) {
        Some(SeriesSnapshot::Rate { passes, fails }) => (*passes, *fails),
        other => panic!("unexpected failure series {other:?}"),
    }
}

#[tokio::test]
async fn successful_request_is_recorded() {
    let (client, metrics) = client(start_server().await, Duration::from_secs(5));

    let outcome = client
        .get("/healthz")
        .check(Check::status_is("status is 200", 200))
        .check(Check::latency_below("under 1s", Duration::from_secs(1)))
        .send()
        .await;

    assert_eq!(Some(200), outcome.status);
    assert_eq!(Some("ok"), outcome.body.as_deref());
    assert!(!outcome.is_failure());
    assert!(outcome.checks_passed());
    assert_eq!((0, 1), failure_counts(&metrics));
    assert_eq!(
        Some(1),
        metrics
            .snapshot()
            .get(builtin::HTTP_REQ_DURATION)
            .map(|s| s.count())
    );
}

#[tokio::test]
async fn server_error_is_a_failure() {
    let (client, metrics) = client(start_server().await, Duration::from_secs(5));

    let outcome = client
        .get("/fail")
        .check(Check::status_is_not("status is not 500", 500))
        .send()
        .await;

    assert_eq!(Some(500), outcome.status);
    assert!(outcome.is_failure());
    assert!(!outcome.checks_passed());
    assert_eq!((1, 0), failure_counts(&metrics));

    let checks = metrics.snapshot().checks().to_vec();
    assert_eq!(1, checks.len());
    assert_eq!(("status is not 500", 0, 1), (checks[0].name.as_str(), checks[0].passes, checks[0].fails));
}

#[tokio::test]
async fn refused_connection_is_a_failure() {
    // Nothing listens on port 1.
    let (client, metrics) = client(
        Url::parse("http://127.0.0.1:1").unwrap(),
        Duration::from_secs(5),
    );

    let outcome = client
        .get("/healthz")
        .check(Check::responded("healthcheck responds"))
        .check(Check::status_below("not server error", 500))
        .send()
        .await;

    assert_eq!(None, outcome.status);
    assert!(outcome.error.is_some());
    assert_eq!(
        &[
            ("healthcheck responds".to_string(), false),
            ("not server error".to_string(), true),
        ],
        outcome.check_results()
    );
    assert_eq!((1, 0), failure_counts(&metrics));
}

#[tokio::test]
async fn timeout_is_a_failure() {
    let (client, metrics) = client(start_server().await, Duration::from_millis(200));

    let outcome = client.get("/slow").send().await;

    assert_eq!(None, outcome.status);
    assert!(outcome.error.is_some());
    assert!(outcome.latency < Duration::from_secs(2));
    assert_eq!((1, 0), failure_counts(&metrics));
}

#[tokio::test]
async fn form_login_then_authorized_json_post() {
    let (client, _) = client(start_server().await, Duration::from_secs(5));

    #[derive(serde::Deserialize)]
    struct Token {
        access_token: String,
    }

    let login = client
        .post("/auth/login")
        .form(&[("username", "loadtest@example.com"), ("password", "secret")])
        .send()
        .await;
    let token = login.json::<Token>().unwrap().access_token;
    assert_eq!("token-123", token);

    let created = client
        .post("/products/")
        .name("create product")
        .bearer_auth(&token)
        .json(&serde_json::json!({ "name": "Product 1", "category": "Electronics" }))
        .check(Check::status_is("product created", 201))
        .send()
        .await;

    assert_eq!("create product", created.name);
    assert_eq!(Some(201), created.status);
    assert!(created.checks_passed());

    let unauthorized = client
        .post("/products/")
        .json(&serde_json::json!({}))
        .send()
        .await;
    assert_eq!(Some(401), unauthorized.status);
    assert_eq!("POST /products/", unauthorized.name);
}

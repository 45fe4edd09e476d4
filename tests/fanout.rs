//! End-to-end fan-out tests: a gateway in front of real axum backends.

mod common;

use common::{client, config_for, failing_backend, gateway, healthy_backend, with_session};
use serde_json::Value;

#[tokio::test]
async fn aggregates_success_and_backend_error() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().get(gw.running.url("/proxy/v2/info")))
        .header("x-relay-endpoints", "a,b")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert!(resp.headers().get("x-correlation-id").is_some());

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["a"]["name"], "a");
    assert_eq!(body["b"]["error"]["statusCode"], 503);
    assert_eq!(body["b"]["error"]["endpoint"], "b");
    assert_eq!(body["b"]["errorResponse"]["description"], "down");
    assert_eq!(body.as_object().unwrap().len(), 2);

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn passthrough_returns_backend_response_verbatim() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().get(gw.running.url("/proxy/missing")))
        .header("x-relay-endpoints", "a")
        .header("x-relay-passthrough", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "not found");

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn passthrough_value_must_be_exactly_true() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().get(gw.running.url("/proxy/v2/info")))
        .header("x-relay-endpoints", "a")
        .header("x-relay-passthrough", "TRUE")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["a"]["name"], "a");

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn cookie_and_control_headers_are_not_forwarded() {
    let a = healthy_backend("a").await;
    let b = healthy_backend("b").await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().get(gw.running.url("/proxy/echo?page=2")))
        .header("x-relay-endpoints", "a,b")
        .header("x-trace-tag", "keep-me")
        .header("referer", "https://console.local")
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();

    let a_headers = &body["a"]["headers"];
    assert!(a_headers.get("cookie").is_none());
    assert!(a_headers.get("referer").is_none());
    assert!(a_headers.get("x-relay-endpoints").is_none());
    assert_eq!(a_headers["x-trace-tag"], "keep-me");
    assert_eq!(a_headers["authorization"], "Bearer token-a");
    assert_eq!(body["a"]["uri"], "/echo?page=2");

    // base64("alice:secret")
    assert_eq!(body["b"]["headers"]["authorization"], "Basic YWxpY2U6c2VjcmV0");

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn unreachable_endpoint_is_a_per_target_error() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().get(gw.running.url("/proxy/v2/info")))
        .header("x-relay-endpoints", "a,dead")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["a"]["name"], "a");
    assert_eq!(body["dead"]["error"]["statusCode"], 500);
    assert!(body["dead"]["error"]["status"].is_string());

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn user_without_token_gets_error_entries() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = client()
        .get(gw.running.url("/proxy/v2/info"))
        .header("cookie", "relay-session=bob-session")
        .header("x-relay-endpoints", "a")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let status = body["a"]["error"]["status"].as_str().unwrap();
    assert!(status.contains("No token found"), "{status}");

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn request_level_errors_are_400() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;
    let url = gw.running.url("/proxy/v2/info");

    let multi = with_session(client().get(&url))
        .header("x-relay-endpoints", "a,b")
        .header("x-relay-passthrough", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(multi.status(), 400);
    let body: Value = multi.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("single endpoint"));

    let unknown = with_session(client().get(&url))
        .header("x-relay-endpoints", "a,nope")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 400);

    let missing = with_session(client().get(&url)).send().await.unwrap();
    assert_eq!(missing.status(), 400);

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn missing_or_unknown_session_is_401() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;
    let url = gw.running.url("/proxy/v2/info");

    let none = client()
        .get(&url)
        .header("x-relay-endpoints", "a")
        .send()
        .await
        .unwrap();
    assert_eq!(none.status(), 401);

    let unknown = client()
        .get(&url)
        .header("cookie", "relay-session=forged")
        .header("x-relay-endpoints", "a")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 401);

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn batch_requests_are_keyed_by_result_key() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let resp = with_session(client().post(gw.running.url("/batch")))
        .json(&serde_json::json!({
            "requests": [
                { "endpoint": "a", "key": "info", "path": "/v2/info" },
                { "endpoint": "a", "key": "missing", "path": "/v2/nothing" },
                { "endpoint": "b", "path": "/v2/info" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["info"]["name"], "a");
    assert_eq!(body["missing"]["error"]["statusCode"], 404);
    assert_eq!(body["missing"]["errorResponse"], "not found");
    assert_eq!(body["b"]["error"]["statusCode"], 503);

    let dup = with_session(client().post(gw.running.url("/batch")))
        .json(&serde_json::json!({
            "requests": [
                { "endpoint": "a", "path": "/v2/info" },
                { "endpoint": "a", "path": "/v2/info" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(dup.status(), 400);

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn stats_count_dispatches_and_failures() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;
    let url = gw.running.url("/proxy/v2/info");

    with_session(client().get(&url))
        .header("x-relay-endpoints", "a,dead")
        .send()
        .await
        .unwrap();
    with_session(client().get(&url))
        .header("x-relay-endpoints", "nope")
        .send()
        .await
        .unwrap();

    let health: relaygate::health::HealthResponse = client()
        .get(gw.running.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.stats.requests_dispatched, 1);
    assert_eq!(health.stats.requests_failed, 1);
    assert_eq!(health.stats.target_failures, 1);

    gw.running.stop();
    a.stop();
    b.stop();
}

#[tokio::test]
async fn malformed_batch_body_is_400_with_message() {
    let a = healthy_backend("a").await;
    let b = failing_backend().await;
    let gw = gateway(config_for(&a, &b)).await;

    let missing_path = with_session(client().post(gw.running.url("/batch")))
        .json(&serde_json::json!({ "requests": [{ "endpoint": "a" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_path.status(), 400);
    let body: Value = missing_path.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("path"));

    let unknown_field = with_session(client().post(gw.running.url("/batch")))
        .json(&serde_json::json!({
            "requests": [{ "endpoint": "a", "path": "/v2/info", "verb": "GET" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_field.status(), 400);
    let body: Value = unknown_field.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("verb"));

    let health: relaygate::health::HealthResponse = client()
        .get(gw.running.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.stats.requests_failed, 2);
    assert_eq!(health.stats.requests_dispatched, 0);

    gw.running.stop();
    a.stop();
    b.stop();
}

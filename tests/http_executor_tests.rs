use std::sync::Arc;
use std::time::Duration;

use chain_runner::bridge::{HttpExecutor, ReqwestExecutor, TransportError};
use chain_runner::chain::{ConcreteRequest, HttpAuthConfig, HttpClientConfig, HttpMethod};
use chain_runner::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(method: HttpMethod, url: String) -> ConcreteRequest {
    ConcreteRequest {
        method,
        url,
        query: BTreeMap::new(),
        headers: BTreeMap::new(),
        body: None,
        unresolved: Vec::new(),
    }
}

#[tokio::test]
async fn test_send_returns_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .and(query_param("expand", "roles"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Request-Id", "req-1")
                .set_body_json(json!({"id": 7})),
        )
        .mount(&server)
        .await;

    let executor = ReqwestExecutor::new(HttpClientConfig::default()).unwrap();
    let mut req = request(HttpMethod::Get, format!("{}/users/7", server.uri()));
    req.query.insert("expand".to_string(), "roles".to_string());

    let response = executor.send(&req, Duration::from_secs(5)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("x-request-id"), Some("req-1"));
    assert_eq!(response.json().unwrap()["id"], 7);
}

#[tokio::test]
async fn test_non_success_status_is_not_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/orders/1"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .mount(&server)
        .await;

    let executor = ReqwestExecutor::new(HttpClientConfig::default()).unwrap();
    let req = request(HttpMethod::Delete, format!("{}/orders/1", server.uri()));

    let response = executor.send(&req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.status, 409);
    assert_eq!(response.body, "conflict");
}

#[tokio::test]
async fn test_client_auth_and_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("Authorization", "Bearer secret"))
        .and(header("X-Env", "staging"))
        .and(body_json(json!({"name": "widget"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = HttpClientConfig::default();
    config.auth = Some(HttpAuthConfig::Bearer {
        token: "secret".to_string(),
    });
    config
        .headers
        .insert("X-Env".to_string(), "staging".to_string());
    let executor = ReqwestExecutor::new(config).unwrap();

    let mut req = request(HttpMethod::Post, format!("{}/items", server.uri()));
    req.headers
        .insert("Content-Type".to_string(), "application/json".to_string());
    req.body = Some(json!({"name": "widget"}).to_string());

    let response = executor.send(&req, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let executor = ReqwestExecutor::new(HttpClientConfig::default()).unwrap();
    let req = request(HttpMethod::Get, format!("{}/slow", server.uri()));

    let err = executor
        .send(&req, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::Timeout(200));
}

#[tokio::test]
async fn test_chain_against_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "demo"})))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = format!(
        r#"
name: live
steps:
  - order: 1
    method: POST
    url: {base}/login
    body: {{"user": "demo"}}
    extract:
      token: body.token
  - order: 2
    url: {base}/me
    headers:
      Authorization: "Bearer {{{{token}}}}"
    extract:
      name: $.name
"#,
        base = server.uri()
    );

    let http = Arc::new(ReqwestExecutor::new(HttpClientConfig::default()).unwrap());
    let result = ChainExecutor::new(http).run_yaml(&yaml).await.unwrap();

    assert_eq!(result.status, ChainStatus::Success);
    assert_eq!(result.variables["name"], "demo");
}

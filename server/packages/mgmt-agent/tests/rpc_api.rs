mod common;

use axum::http::{Method, StatusCode};
use base64::Engine;
use mgmt_agent::host::HostRuntime;
use mgmt_agent::router::AuthConfig;
use serde_json::json;

use common::*;

#[tokio::test]
async fn health_is_open_even_with_auth() {
    let test_app = TestApp::new_with_auth(AuthConfig::with_token("secret".to_string()));

    let (status, _, bytes) =
        send_request(&test_app.app, Method::GET, "/v1/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    insta::assert_json_snapshot!(parse_json(&bytes), @r###"
    {
      "status": "ok"
    }
    "###);

    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
    let (status, _, bytes) =
        send_request(&test_app.app, Method::POST, "/v1/rpc", Some(body.clone()), &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let problem = parse_json(&bytes);
    assert_eq!(problem["type"], "urn:mgmt-agent:error:token_invalid");

    let (status, _, bytes) = send_request(
        &test_app.app,
        Method::POST,
        "/v1/rpc",
        Some(body),
        &[("authorization", "Bearer secret")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(&bytes)["result"], json!(true));
}

#[tokio::test]
async fn unknown_methods_use_method_not_found_code() {
    let test_app = TestApp::new();
    let response = rpc(&test_app.app, "frobnicate", json!({})).await;
    assert_eq!(response["error"]["code"], json!(-32601));
    assert_eq!(
        response["error"]["data"]["type"],
        "urn:mgmt-agent:error:method_not_found"
    );
}

#[tokio::test]
async fn bad_params_use_invalid_params_code() {
    let test_app = TestApp::new();
    let response = rpc(&test_app.app, "redirect", json!({ "port": "nope" })).await;
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn missing_subsystem_is_skipped_not_an_error() {
    let test_app = TestApp::new();
    let response = rpc(&test_app.app, "listComponents", json!(null)).await;
    insta::assert_json_snapshot!(response, @r###"
    {
      "id": 1,
      "jsonrpc": "2.0",
      "result": {
        "message": "SCR bundle is not installed or wired",
        "status": "SKIPPED"
      }
    }
    "###);
}

#[tokio::test]
async fn install_and_start_over_rpc() {
    let test_app = TestApp::new();
    let image = base64::engine::general_purpose::STANDARD.encode(unit_image("com.acme.web", "1.0.0"));

    let response = rpc(&test_app.app, "install", json!({ "image": image, "startLevel": 2 })).await;
    let unit = &response["result"];
    assert_eq!(unit["symbolicName"], "com.acme.web");
    assert_eq!(unit["location"], "manual:com.acme.web");
    assert_eq!(unit["startLevel"], json!(2));
    let id = unit["id"].as_u64().expect("unit id");

    let response = rpc(&test_app.app, "start", json!({ "ids": [id, 4242] })).await;
    assert_eq!(response["result"], json!("unit 4242 does not exist\n"));

    let response = rpc(&test_app.app, "listUnits", json!(null)).await;
    let states: Vec<_> = response["result"]
        .as_array()
        .expect("unit list")
        .iter()
        .filter(|unit| unit["id"] == json!(id))
        .map(|unit| unit["state"].clone())
        .collect();
    assert_eq!(states, vec![json!("ACTIVE")]);

    let response = rpc(&test_app.app, "install", json!({ "image": "***" })).await;
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn batch_install_reports_undecodable_images_as_lines() {
    let test_app = TestApp::new();
    let good = base64::engine::general_purpose::STANDARD.encode(unit_image("com.acme.batch", "1.0.0"));

    let response = rpc(
        &test_app.app,
        "installBatch",
        json!({ "images": [good, "!!notbase64"] }),
    )
    .await;
    assert_eq!(response["result"]["status"], "SUCCESS");
    let message = response["result"]["message"].as_str().expect("message");
    assert_eq!(message.lines().count(), 1);
    assert!(message.contains("not valid base64"));
    assert!(test_app.host.unit_by_location("manual:com.acme.batch").is_some());
}

#[tokio::test]
async fn configuration_round_trip_over_rpc() {
    let test_app = TestApp::new();
    let response = rpc(
        &test_app.app,
        "createOrUpdateConfiguration",
        json!({
            "pid": "com.acme.http",
            "properties": [{ "key": "port", "type": "INTEGER", "value": "8080" }]
        }),
    )
    .await;
    assert_eq!(response["result"]["status"], "SUCCESS");

    let response = rpc(&test_app.app, "listConfigurations", json!(null)).await;
    assert_eq!(response["result"]["status"], "SUCCESS");
    assert_eq!(response["result"]["value"][0]["pid"], "com.acme.http");
    assert_eq!(response["result"]["value"][0]["properties"]["port"], json!(8080));

    let response = rpc(&test_app.app, "deleteConfiguration", json!({ "pid": "com.acme.http" })).await;
    assert_eq!(response["result"]["status"], "SUCCESS");
}

#[tokio::test]
async fn extension_failures_are_link_errors() {
    let test_app = TestApp::new();
    let response = rpc(
        &test_app.app,
        "executeExtension",
        json!({ "name": "missing", "context": {} }),
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32001));
    assert_eq!(
        response["error"]["message"],
        "agent extension with name 'missing' doesn't exist"
    );

    register_extension(&test_app.host, "double", std::sync::Arc::new(Doubler));
    let response = rpc(
        &test_app.app,
        "executeExtension",
        json!({ "name": "double", "context": { "a": 21 } }),
    )
    .await;
    assert_eq!(response["result"], json!({ "doubled": 42 }));
}

#[tokio::test]
async fn shell_commands_run_through_the_local_session() {
    let test_app = TestApp::new();
    let response = rpc(&test_app.app, "execShellCommand", json!({ "text": "echo hi" })).await;
    assert_eq!(response["result"], json!("hi"));
}

#[tokio::test]
async fn calls_after_abort_report_link_closed() {
    let test_app = TestApp::new();
    let response = rpc(&test_app.app, "abort", json!(null)).await;
    assert_eq!(response["result"], json!(true));
    assert!(!test_app.agent.is_open());

    let response = rpc(&test_app.app, "ping", json!(null)).await;
    assert_eq!(response["error"]["code"], json!(-32006));
    assert_eq!(response["error"]["data"]["status"], json!(503));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let test_app = TestApp::new();
    let (status, _, bytes) =
        send_request(&test_app.app, Method::GET, "/v1/openapi.json", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let doc = parse_json(&bytes);
    assert!(doc["paths"]["/v1/rpc"].is_object());
}

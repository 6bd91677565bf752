#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use mgmt_agent::config::AgentConfig;
use mgmt_agent::descriptor::MANIFEST_PATH;
use mgmt_agent::dto::{HealthCheckInfo, HealthCheckResult, HealthStatus};
use mgmt_agent::extensions::{Extension, ExtensionError, EXTENSION_NAME_PROPERTY};
use mgmt_agent::host::{
    CommandShell, HealthCheckExecutor, HostError, InMemoryHost, ServiceKind, ShellSession,
};
use mgmt_agent::router::{build_router, AppState, AuthConfig};
use mgmt_agent::values::{Payload, PayloadShape, TypedValue, ValueKind};
use mgmt_agent::AgentServer;

/// A deployable unit archive carrying only a manifest.
pub fn unit_image(symbolic_name: &str, version: &str) -> Vec<u8> {
    let manifest = format!(
        "Manifest-Version: 1.0\nUnit-SymbolicName: {symbolic_name}\nUnit-Version: {version}\n\n"
    );
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(MANIFEST_PATH, zip::write::FileOptions::default())
        .expect("start manifest");
    writer.write_all(manifest.as_bytes()).expect("write manifest");
    writer.finish().expect("finish archive").into_inner()
}

pub fn corrupt_image() -> Vec<u8> {
    b"definitely not an archive".to_vec()
}

pub fn new_agent(host: &Arc<InMemoryHost>) -> Arc<AgentServer> {
    AgentServer::new(host.clone(), AgentConfig::default(), None)
}

/// Shell double counting how many sessions were opened and closed.
#[derive(Default)]
pub struct CountingShell {
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

impl CountingShell {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CountingSession {
    closed: Arc<AtomicUsize>,
}

impl CommandShell for CountingShell {
    fn open_session(&self) -> Result<Box<dyn ShellSession>, HostError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSession {
            closed: self.closed.clone(),
        }))
    }
}

impl ShellSession for CountingSession {
    fn execute(&mut self, line: &str) -> Result<String, HostError> {
        Ok(format!("ran: {line}"))
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Extension doubling its required integer input `a`.
pub struct Doubler;

impl Extension for Doubler {
    fn input_shape(&self) -> PayloadShape {
        PayloadShape::new().required("a", ValueKind::Integer)
    }

    fn execute(&self, input: Payload) -> Result<Payload, ExtensionError> {
        let Some(TypedValue::Integer(a)) = input.get("a") else {
            return Err(ExtensionError::Failed("a is required".to_string()));
        };
        let mut output = Payload::new();
        output.insert("doubled".to_string(), TypedValue::Integer(a * 2));
        Ok(output)
    }
}

pub fn register_extension(host: &InMemoryHost, name: &str, extension: Arc<dyn Extension>) -> u64 {
    let mut properties = BTreeMap::new();
    properties.insert(
        EXTENSION_NAME_PROPERTY.to_string(),
        TypedValue::String(name.to_string()),
    );
    host.register_service(ServiceKind::Extension, properties, Some(extension))
}

pub struct StaticHealthChecks;

impl HealthCheckExecutor for StaticHealthChecks {
    fn checks(&self) -> Vec<HealthCheckInfo> {
        vec![HealthCheckInfo {
            name: "disk".to_string(),
            tags: vec!["storage".to_string()],
            service_id: 7,
        }]
    }

    fn execute(&self, _tags: &[String], _names: &[String]) -> Vec<HealthCheckResult> {
        vec![HealthCheckResult {
            name: "disk".to_string(),
            tags: vec!["storage".to_string()],
            status: HealthStatus::Ok,
            message: "enough space".to_string(),
            elapsed_ms: 1,
        }]
    }
}

pub struct TestApp {
    pub app: Router,
    pub host: Arc<InMemoryHost>,
    pub agent: Arc<AgentServer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::new_with_auth(AuthConfig::disabled())
    }

    pub fn new_with_auth(auth: AuthConfig) -> Self {
        let host = InMemoryHost::standalone();
        let agent = new_agent(&host);
        let app = build_router(AppState::new(auth, agent.clone()));
        Self { app, host, agent }
    }
}

pub async fn send_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request_body = if let Some(body) = body {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(body.to_string())
    } else {
        Body::empty()
    };

    let request = builder.body(request_body).expect("build request");
    let response = app.clone().oneshot(request).await.expect("request handled");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();

    (status, headers, bytes.to_vec())
}

pub fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).expect("valid json")
    }
}

/// Posts one JSON-RPC call and returns the decoded envelope.
pub async fn rpc(app: &Router, method: &str, params: Value) -> Value {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let (status, _, bytes) = send_request(app, Method::POST, "/v1/rpc", Some(body), &[]).await;
    assert_eq!(status, StatusCode::OK, "rpc transport status");
    parse_json(&bytes)
}

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use mgmt_agent_error::{AgentError, ErrorType, ProblemDetails};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{Modify, OpenApi};

use crate::agent::AgentServer;
use crate::config::DEFAULT_PORT;

mod rpc;
mod types;

pub use self::types::*;

pub struct AppState {
    agent: Arc<AgentServer>,
    auth: AuthConfig,
}

impl AppState {
    pub fn new(auth: AuthConfig, agent: Arc<AgentServer>) -> Self {
        Self { agent, auth }
    }

    pub fn agent(&self) -> &Arc<AgentServer> {
        &self.agent
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        Self { token: None }
    }

    pub fn with_token(token: String) -> Self {
        Self { token: Some(token) }
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_state(Arc::new(state)).0
}

pub fn build_router_with_state(shared: Arc<AppState>) -> (Router, Arc<AppState>) {
    let mut v1_router = Router::new()
        .route("/health", get(get_health))
        .route("/rpc", post(post_rpc))
        .route("/events", get(get_events_sse))
        .route("/openapi.json", get(get_openapi))
        .with_state(shared.clone());

    if shared.auth.token.is_some() {
        v1_router = v1_router.layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            require_token,
        ));
    }

    let mut router = Router::new().nest("/v1", v1_router).fallback(not_found);

    if shared.agent.config().log_http {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|req: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri()
                )
            })
            .on_request(|_req: &Request<_>, span: &Span| {
                tracing::info!(parent: span, "request");
            })
            .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                tracing::info!(
                    parent: span,
                    status = %res.status(),
                    latency_ms = latency.as_millis()
                );
            });
        router = router.layer(trace_layer);
    }

    (router, shared)
}

#[derive(OpenApi)]
#[openapi(
    paths(get_health, post_rpc, get_events_sse),
    components(
        schemas(
            HealthResponse,
            RpcRequest,
            RpcResponse,
            RpcErrorBody,
            ProblemDetails,
            ErrorType,
            crate::dto::UnitInfo,
            crate::dto::UnitState,
            crate::dto::UnitRevision,
            crate::dto::NamespaceRecord,
            crate::dto::OpResult,
            crate::dto::ResultStatus,
            crate::dto::ComponentInfo,
            crate::dto::ComponentState,
            crate::dto::ConfigurationInfo,
            crate::dto::ConfigurationSource,
            crate::dto::PropertyInfo,
            crate::dto::PropertyKind,
            crate::dto::ServiceInfo,
            crate::dto::ThreadInfo,
            crate::dto::RoleInfo,
            crate::dto::RoleType,
            crate::dto::HealthCheckInfo,
            crate::dto::HealthCheckResult,
            crate::dto::HealthStatus,
            crate::dto::HttpComponentInfo,
            crate::dto::LoggerContextInfo,
            crate::dto::DeviceNode,
            crate::dto::DeviceValueType,
            crate::dto::MemoryInfo,
            crate::dto::HeapUsage,
            crate::dto::MemoryPoolUsage,
            crate::dto::HeapDump,
            crate::values::ConfigValue,
            crate::values::ValueType,
            crate::host::BusEvent,
            crate::host::LogRecord,
        )
    ),
    tags(
        (name = "meta", description = "Service metadata"),
        (name = "rpc", description = "Management operations"),
        (name = "events", description = "Push events")
    ),
    modifiers(&ServerAddon)
)]
pub struct ApiDoc;

struct ServerAddon;

impl Modify for ServerAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.servers = Some(vec![utoipa::openapi::Server::new(format!(
            "http://localhost:{DEFAULT_PORT}"
        ))]);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Agent(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(problem)).into_response()
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 Not Found")
}

#[utoipa::path(
    get,
    path = "/v1/health",
    responses((status = 200, body = HealthResponse)),
    tag = "meta"
)]
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn get_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/v1/rpc",
    request_body = RpcRequest,
    responses((status = 200, body = RpcResponse)),
    tag = "rpc"
)]
async fn post_rpc(State(state): State<Arc<AppState>>, Json(request): Json<Value>) -> Json<RpcResponse> {
    let request = match serde_json::from_value::<RpcRequest>(request) {
        Ok(request) => request,
        Err(err) => {
            let err = AgentError::invalid_request(format!("malformed request envelope: {err}"));
            return Json(RpcResponse::failure(Value::Null, &err));
        }
    };
    let id = request.id.clone();

    if !state.agent.is_open() {
        return Json(RpcResponse::failure(id, &AgentError::LinkClosed));
    }

    match rpc::dispatch(&state.agent, &request.method, request.params).await {
        Ok(result) => Json(RpcResponse::success(id, result)),
        Err(err) => {
            tracing::warn!(method = %request.method, error = %err, "rpc call failed");
            Json(RpcResponse::failure(id, &err))
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/events",
    params(
        ("last-event-id" = Option<u64>, Header, description = "Last seen push sequence (exclusive)")
    ),
    responses((status = 200, description = "SSE stream of push events")),
    tag = "events"
)]
async fn get_events_sse(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let last_event_id = headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let stream = state.agent.push_channel().sse_stream(last_event_id);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if path == "/v1/health" || path == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = match &state.auth.token {
        Some(token) => token.as_str(),
        None => return Ok(next.run(req).await),
    };

    let provided = extract_token(req.headers());
    if provided.as_deref() == Some(expected) {
        Ok(next.run(req).await)
    } else {
        Err(AgentError::TokenInvalid {
            message: Some("missing or invalid token".to_string()),
        }
        .into())
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some((scheme, rest)) = value.trim().split_once(' ') {
                if matches!(scheme.to_ascii_lowercase().as_str(), "bearer" | "token") {
                    return Some(rest.trim().to_string());
                }
            }
        }
    }

    headers
        .get("x-agent-token")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_and_header_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        let mut headers = HeaderMap::new();
        headers.insert("x-agent-token", HeaderValue::from_static("xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn openapi_lists_rpc_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/rpc"));
        assert!(doc.paths.paths.contains_key("/v1/events"));
    }
}

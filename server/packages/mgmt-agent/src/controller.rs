//! Controller side of the link: issues calls against a running agent and
//! keeps the link alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::router::{RpcRequest, RpcResponse};

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status: {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("malformed rpc response: {0}")]
    Malformed(String),
}

pub struct ControllerClient {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl ControllerClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, ControllerError> {
        Ok(Self {
            endpoint: endpoint.into(),
            token,
            client: reqwest::Client::builder().build()?,
            next_id: AtomicU64::new(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    /// Sends one call and returns its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ControllerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut builder = self
            .client
            .post(self.url("/v1/rpc"))
            .json(&RpcRequest::new(id, method, params));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControllerError::HttpStatus(status));
        }
        let response: RpcResponse = response.json().await?;
        if let Some(error) = response.error {
            return Err(ControllerError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data.and_then(|problem| serde_json::to_value(problem).ok()),
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn ping(&self) -> Result<bool, ControllerError> {
        match self.call("ping", Value::Null).await? {
            Value::Bool(alive) => Ok(alive),
            other => Err(ControllerError::Malformed(format!(
                "ping returned {other}"
            ))),
        }
    }

    /// Pings every `interval` until the first failure, then reports the
    /// agent as disconnected and returns. A broken link is never retried.
    pub async fn keep_alive(&self, interval: Duration) -> ControllerError {
        loop {
            tokio::time::sleep(interval).await;
            let failure = match self.ping().await {
                Ok(true) => {
                    tracing::debug!(endpoint = %self.endpoint, "agent alive");
                    continue;
                }
                Ok(false) => ControllerError::Malformed("agent reported link down".to_string()),
                Err(err) => err,
            };
            tracing::warn!(endpoint = %self.endpoint, error = %failure, "agent disconnected");
            return failure;
        }
    }
}

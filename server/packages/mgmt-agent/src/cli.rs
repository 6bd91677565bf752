use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agent::AgentServer;
use crate::config::{AgentConfig, ConfigError, DEFAULT_HOST, DEFAULT_PORT};
use crate::controller::{ControllerClient, ControllerError};
use crate::host::InMemoryHost;
use crate::router::{build_router_with_state, AppState, AuthConfig};

#[derive(Parser, Debug)]
#[command(name = "mgmt-agent", bin_name = "mgmt-agent")]
#[command(about = "Remote management agent", version)]
#[command(arg_required_else_help = true)]
pub struct MgmtAgentCli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, short = 't', global = true, env = "MGMT_AGENT_TOKEN")]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent over HTTP against a standalone in-memory runtime.
    Server(ServerArgs),
    /// Issue one management call against a running agent.
    Call(CallArgs),
    /// Keep the link to a running agent alive until it drops.
    Ping(PingArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    #[arg(long, short = 'H')]
    host: Option<String>,

    #[arg(long, short = 'p')]
    port: Option<u16>,

    #[arg(long)]
    result_timeout_ms: Option<u64>,

    #[arg(long)]
    watchdog_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    #[arg(long, short = 'e')]
    endpoint: Option<String>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Operation name, e.g. `listUnits`.
    method: String,

    /// JSON object with the call parameters.
    #[arg(long)]
    params: Option<String>,

    #[command(flatten)]
    client: ClientArgs,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    client: ClientArgs,

    #[arg(long, default_value_t = 20)]
    interval_secs: u64,

    /// Ping a single time and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(String),
}

pub fn run_mgmt_agent() -> Result<(), CliError> {
    let cli = MgmtAgentCli::parse();
    if let Err(err) = init_logging() {
        eprintln!("failed to init logging: {err}");
        return Err(err);
    }
    run_command(&cli.command, cli.token)
}

pub fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_logfmt::builder()
                .layer()
                .with_writer(std::io::stderr),
        )
        .init();
    Ok(())
}

pub fn run_command(command: &Command, token: Option<String>) -> Result<(), CliError> {
    match command {
        Command::Server(args) => run_server(args, token),
        Command::Call(args) => run_call(args, token),
        Command::Ping(args) => run_ping(args, token),
    }
}

fn server_config(args: &ServerArgs, token: Option<String>) -> Result<AgentConfig, CliError> {
    let mut config = AgentConfig::from_env()?;
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if token.is_some() {
        config.token = token;
    }
    if let Some(ms) = args.result_timeout_ms {
        config.result_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = args.watchdog_timeout_ms {
        config.watchdog_timeout = Duration::from_millis(ms);
    }
    Ok(config)
}

fn build_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))
}

fn run_server(args: &ServerArgs, token: Option<String>) -> Result<(), CliError> {
    let config = server_config(args, token)?;
    let auth = match config.token.clone() {
        Some(token) => AuthConfig::with_token(token),
        None => AuthConfig::disabled(),
    };
    let addr = format!("{}:{}", config.host, config.port);
    let runtime = build_runtime()?;

    runtime.block_on(async move {
        let host = InMemoryHost::standalone();
        let agent = AgentServer::new(host, config, None);
        let state = Arc::new(AppState::new(auth, agent.clone()));
        let (router, _state) = build_router_with_state(state);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "agent listening");
        let shutdown_agent = agent.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        shutdown_agent.shutdown().await;
                    }
                    _ = shutdown_agent.lifecycle().closed() => {
                        tracing::info!("link closed by controller");
                    }
                }
            })
            .await
            .map_err(|err| CliError::Server(err.to_string()))
    })
}

fn endpoint(args: &ClientArgs) -> String {
    args.endpoint
        .clone()
        .unwrap_or_else(|| format!("http://{DEFAULT_HOST}:{DEFAULT_PORT}"))
}

fn run_call(args: &CallArgs, token: Option<String>) -> Result<(), CliError> {
    let params: Value = match &args.params {
        Some(raw) => serde_json::from_str(raw)?,
        None => Value::Null,
    };
    let client = ControllerClient::new(endpoint(&args.client), token)?;
    let runtime = build_runtime()?;
    match runtime.block_on(client.call(&args.method, params)) {
        Ok(result) => write_stdout_line(&serde_json::to_string_pretty(&result)?),
        Err(ControllerError::Rpc { code, message, data }) => {
            let body = serde_json::json!({ "code": code, "message": message, "data": data });
            write_stderr_line(&serde_json::to_string_pretty(&body)?)?;
            Err(ControllerError::Rpc { code, message, data: None }.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_ping(args: &PingArgs, token: Option<String>) -> Result<(), CliError> {
    let client = ControllerClient::new(endpoint(&args.client), token)?;
    let runtime = build_runtime()?;
    runtime.block_on(async {
        if args.once {
            let alive = client.ping().await?;
            return write_stdout_line(if alive { "alive" } else { "down" });
        }
        let interval = Duration::from_secs(args.interval_secs.max(1));
        let failure = client.keep_alive(interval).await;
        write_stderr_line(&format!("agent disconnected: {failure}"))?;
        Err(failure.into())
    })
}

fn write_stdout_line(text: &str) -> Result<(), CliError> {
    let mut out = std::io::stdout();
    out.write_all(text.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn write_stderr_line(text: &str) -> Result<(), CliError> {
    let mut out = std::io::stderr();
    out.write_all(text.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = MgmtAgentCli::parse_from([
            "mgmt-agent",
            "server",
            "--port",
            "9100",
            "--watchdog-timeout-ms",
            "500",
            "--token",
            "abc",
        ]);
        let Command::Server(args) = &cli.command else {
            panic!("expected server command");
        };
        let config = server_config(args, cli.token.clone()).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.watchdog_timeout, Duration::from_millis(500));
        assert_eq!(config.token.as_deref(), Some("abc"));
    }

    #[test]
    fn call_parses_method_and_params() {
        let cli = MgmtAgentCli::parse_from([
            "mgmt-agent",
            "call",
            "start",
            "--params",
            r#"{"ids":[1,2]}"#,
        ]);
        let Command::Call(args) = &cli.command else {
            panic!("expected call command");
        };
        assert_eq!(args.method, "start");
        assert_eq!(args.params.as_deref(), Some(r#"{"ids":[1,2]}"#));
    }
}

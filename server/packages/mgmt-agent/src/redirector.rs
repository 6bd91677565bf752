//! Single active interactive session multiplexed onto the link.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mgmt_agent_error::AgentError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::host::{HostRuntime, ShellSession};
use crate::push::{PushChannel, PushEvent};

/// No redirection.
pub const NONE: i32 = 0;
/// Local command-shell session. Every port at or below this value selects one.
pub const COMMAND_SESSION: i32 = -1;
/// Echo input back as output.
pub const CONSOLE: i32 = 1;

/// Lines buffered for a connected socket client before input is dropped.
const SOCKET_BACKLOG: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    None,
    LocalShell,
    Console,
    Socket(u16),
}

impl RedirectTarget {
    pub fn from_port(port: i32) -> Result<Self, AgentError> {
        match port {
            NONE => Ok(RedirectTarget::None),
            CONSOLE => Ok(RedirectTarget::Console),
            port if port <= COMMAND_SESSION => Ok(RedirectTarget::LocalShell),
            port => u16::try_from(port)
                .map(RedirectTarget::Socket)
                .map_err(|_| AgentError::invalid_request(format!("port {port} is out of range"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    Unchanged,
    Switched,
}

impl RedirectOutcome {
    pub fn switched(self) -> bool {
        self == RedirectOutcome::Switched
    }
}

enum ActiveSession {
    Idle,
    Shell(Box<dyn ShellSession>),
    Console,
    Socket {
        writer: mpsc::Sender<String>,
        connected: Arc<AtomicBool>,
        task: JoinHandle<()>,
    },
}

struct Slot {
    port: i32,
    session: ActiveSession,
    last_output: Option<String>,
}

pub struct Redirector {
    host: Arc<dyn HostRuntime>,
    push: PushChannel,
    slot: Mutex<Slot>,
}

impl Redirector {
    pub fn new(host: Arc<dyn HostRuntime>, push: PushChannel) -> Self {
        Self {
            host,
            push,
            slot: Mutex::new(Slot {
                port: NONE,
                session: ActiveSession::Idle,
                last_output: None,
            }),
        }
    }

    pub async fn port(&self) -> i32 {
        self.slot.lock().await.port
    }

    pub async fn target(&self) -> RedirectTarget {
        let port = self.port().await;
        RedirectTarget::from_port(port).unwrap_or(RedirectTarget::None)
    }

    /// Switches the active target. Requesting the current port is a no-op.
    pub async fn redirect(&self, port: i32) -> Result<RedirectOutcome, AgentError> {
        let mut slot = self.slot.lock().await;
        self.redirect_locked(&mut slot, port).await
    }

    /// Forwards `text` to the active target; `false` when nothing is active
    /// or a socket target has no connected client. Never waits on a client.
    pub async fn stdin(&self, text: &str) -> Result<bool, AgentError> {
        let mut slot = self.slot.lock().await;
        Ok(self.stdin_locked(&mut slot, text).await)
    }

    /// Runs one line in a local shell session and returns its output.
    pub async fn exec_shell_command(&self, command: &str) -> Result<Option<String>, AgentError> {
        let mut slot = self.slot.lock().await;
        self.redirect_locked(&mut slot, COMMAND_SESSION).await?;
        self.stdin_locked(&mut slot, command).await;
        Ok(slot.last_output.clone())
    }

    pub async fn last_output(&self) -> Option<String> {
        self.slot.lock().await.last_output.clone()
    }

    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        close_session(&mut slot);
    }

    async fn redirect_locked(&self, slot: &mut Slot, port: i32) -> Result<RedirectOutcome, AgentError> {
        if slot.port == port {
            return Ok(RedirectOutcome::Unchanged);
        }
        let target = RedirectTarget::from_port(port)?;
        close_session(slot);

        slot.session = match target {
            RedirectTarget::None => return Ok(RedirectOutcome::Switched),
            RedirectTarget::LocalShell => {
                let shell = self.host.command_shell().ok_or_else(|| AgentError::ShellUnavailable {
                    message: Some("command shell is not present in this runtime".to_string()),
                })?;
                let session = shell.open_session().map_err(|err| AgentError::ShellUnavailable {
                    message: Some(err.to_string()),
                })?;
                ActiveSession::Shell(session)
            }
            RedirectTarget::Console => ActiveSession::Console,
            RedirectTarget::Socket(socket_port) => self.open_socket(socket_port).await?,
        };
        slot.port = port;
        tracing::info!(port = port, target = ?target, "session redirected");
        Ok(RedirectOutcome::Switched)
    }

    async fn stdin_locked(&self, slot: &mut Slot, text: &str) -> bool {
        match &mut slot.session {
            ActiveSession::Idle => false,
            ActiveSession::Shell(session) => {
                let output = match session.execute(text) {
                    Ok(output) => output,
                    Err(err) => err.to_string(),
                };
                self.push.publish(PushEvent::Stdout(output.clone()));
                slot.last_output = Some(output);
                true
            }
            ActiveSession::Console => {
                self.push.publish(PushEvent::Stdout(text.to_string()));
                slot.last_output = Some(text.to_string());
                true
            }
            ActiveSession::Socket {
                writer, connected, ..
            } => {
                if !connected.load(Ordering::SeqCst) {
                    tracing::debug!(port = slot.port, "socket redirect has no connected client");
                    return false;
                }
                match writer.try_send(text.to_string()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(port = slot.port, "socket redirect backlog full, input dropped");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            }
        }
    }

    async fn open_socket(&self, port: u16) -> Result<ActiveSession, AgentError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|err| AgentError::HostFailure {
                message: format!("cannot bind redirect socket on port {port}: {err}"),
            })?;
        let (writer, mut inbound) = mpsc::channel::<String>(SOCKET_BACKLOG);
        let connected = Arc::new(AtomicBool::new(false));
        let client_flag = connected.clone();
        let push = self.push.clone();
        let task = tokio::spawn(async move {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(port = port, error = %err, "redirect socket accept failed");
                    return;
                }
            };
            tracing::info!(port = port, peer = %peer, "redirect socket client connected");
            client_flag.store(true, Ordering::SeqCst);
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            push.publish(PushEvent::Stdout(line));
                        }
                        _ => break,
                    },
                    text = inbound.recv() => match text {
                        Some(text) => {
                            let mut bytes = text.into_bytes();
                            bytes.push(b'\n');
                            if write_half.write_all(&bytes).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            client_flag.store(false, Ordering::SeqCst);
            tracing::info!(port = port, "redirect socket closed");
        });
        Ok(ActiveSession::Socket {
            writer,
            connected,
            task,
        })
    }
}

fn close_session(slot: &mut Slot) {
    match std::mem::replace(&mut slot.session, ActiveSession::Idle) {
        ActiveSession::Idle => {}
        ActiveSession::Shell(mut session) => session.close(),
        ActiveSession::Console => {}
        ActiveSession::Socket { writer, task, .. } => {
            drop(writer);
            task.abort();
        }
    }
    slot.port = NONE;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_sentinels_map_to_targets() {
        assert_eq!(RedirectTarget::from_port(0).unwrap(), RedirectTarget::None);
        assert_eq!(RedirectTarget::from_port(-1).unwrap(), RedirectTarget::LocalShell);
        assert_eq!(RedirectTarget::from_port(-7).unwrap(), RedirectTarget::LocalShell);
        assert_eq!(RedirectTarget::from_port(1).unwrap(), RedirectTarget::Console);
        assert_eq!(
            RedirectTarget::from_port(4000).unwrap(),
            RedirectTarget::Socket(4000)
        );
        assert!(RedirectTarget::from_port(70000).is_err());
    }
}

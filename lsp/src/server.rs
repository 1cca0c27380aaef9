//! Server processes and the JSON-RPC connection to them.
//!
//! A [`Connection`] owns two tasks: the writer drains an mpsc queue into the
//! server's stdin, the reader parses stdout frames, answers server-initiated
//! requests and forwards everything else to the manager as
//! [`ConnectionEvent`]s tagged with the connection generation.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{self, MessageParams, Notification, PublishDiagnosticsParams, Request};
use crate::types::{ClientError, ClientKey, MessageLevel, ServerDiagnostic, WorkspaceFolder};

/// Bound on every ordinary request, `initialize` included.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on each teardown step: the `shutdown` round-trip and the child exit.
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Program and arguments of a language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory. `None` inherits Kestrel's.
    pub cwd: Option<PathBuf>,
}

/// Byte streams of a launched server. `child` is absent for in-memory servers.
pub struct ServerProcess {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub child: Option<Child>,
}

pub type LaunchFut<'a> = Pin<Box<dyn Future<Output = Result<ServerProcess>> + Send + 'a>>;

pub trait ServerLauncher: Send + Sync {
    fn launch<'a>(&'a self, command: &'a ServerCommand) -> LaunchFut<'a>;
}

/// Spawns servers as child processes with piped stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Bare names go through `PATH`; anything with a directory is used as-is.
    fn resolve(program: &Path) -> Result<PathBuf> {
        if program.components().count() > 1 {
            return Ok(program.to_path_buf());
        }
        which::which(program).with_context(|| format!("{} not found in PATH", program.display()))
    }
}

impl ServerLauncher for ProcessLauncher {
    fn launch<'a>(&'a self, command: &'a ServerCommand) -> LaunchFut<'a> {
        Box::pin(async move {
            let program = Self::resolve(&command.program)?;
            let mut cmd = Command::new(&program);
            cmd.args(&command.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            if let Some(cwd) = &command.cwd {
                cmd.current_dir(cwd);
            }

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning {}", program.display()))?;
            let stdin = child.stdin.take().context("no stdin from child")?;
            let stdout = child.stdout.take().context("no stdout from child")?;
            tracing::debug!(program = %program.display(), pid = child.id(), "Spawned language server");

            Ok(ServerProcess {
                stdin: Box::new(stdin),
                stdout: Box::new(stdout),
                child: Some(child),
            })
        })
    }
}

/// Why a connection's reader stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StopReason {
    Exited,
    Failed(String),
}

#[derive(Debug)]
pub(crate) enum EventKind {
    Diagnostics {
        path: PathBuf,
        items: Vec<ServerDiagnostic>,
    },
    Message {
        level: MessageLevel,
        message: String,
        show: bool,
    },
    Stopped(StopReason),
}

#[derive(Debug)]
pub(crate) struct ConnectionEvent {
    pub key: ClientKey,
    pub generation: u64,
    pub kind: EventKind,
}

enum WriterCommand {
    Send(Value),
    Shutdown,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Cloneable request/notification surface of one connection.
#[derive(Clone)]
pub(crate) struct RpcChannel {
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl RpcChannel {
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request::new(id, method, params))
            .map_err(|_| ClientError::ChannelClosed)?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(ClientError::ChannelClosed);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                return Err(ClientError::ChannelClosed);
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ClientError::Timeout {
                    method: method.to_string(),
                });
            }
        };

        if let Some(error) = response.get("error") {
            return Err(ClientError::Rpc {
                code: error["code"].as_i64().unwrap_or(protocol::INTERNAL_ERROR),
                message: error["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let frame = serde_json::to_value(Notification::new(method, params))
            .map_err(|_| ClientError::ChannelClosed)?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }
}

enum IncomingFrame {
    Response {
        id: u64,
        body: Value,
    },
    ServerRequest {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

fn parse_incoming(frame: &Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(Value::as_str).map(String::from);
    let is_response = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, is_response) {
        (Some(id), None, true) => Some(IncomingFrame::Response {
            id: id.as_u64()?,
            body: frame.clone(),
        }),
        (Some(id), Some(method), _) => Some(IncomingFrame::ServerRequest {
            id: id.clone(),
            method,
            params: frame.get("params").cloned(),
        }),
        (None, Some(method), _) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Everything the reader task needs, bundled so dispatch is testable
/// without a live server.
struct Dispatcher {
    key: ClientKey,
    generation: u64,
    pending: PendingMap,
    writer_tx: mpsc::Sender<WriterCommand>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    /// Set once teardown begins; the end of the stream is then expected.
    closing: Arc<AtomicBool>,
}

impl Dispatcher {
    fn emit(&self, kind: EventKind) {
        let event = ConnectionEvent {
            key: self.key.clone(),
            generation: self.generation,
            kind,
        };
        if self.events.send(event).is_err() {
            tracing::trace!(client = %self.key, "Manager gone; dropping connection event");
        }
    }

    async fn dispatch(&self, frame: &Value) {
        let Some(incoming) = parse_incoming(frame) else {
            tracing::trace!(client = %self.key, "Ignoring malformed JSON-RPC frame");
            return;
        };
        match incoming {
            IncomingFrame::Response { id, body } => {
                if let Some(tx) = self.pending.lock().await.remove(&id) {
                    let _ = tx.send(body);
                }
            }
            IncomingFrame::ServerRequest { id, method, params } => {
                let response = Self::answer(&id, &method, params.as_ref());
                let _ = self.writer_tx.send(WriterCommand::Send(response)).await;
            }
            IncomingFrame::Notification { method, params } => {
                self.notification(&method, params).await;
            }
        }
    }

    fn answer(id: &Value, method: &str, params: Option<&Value>) -> Value {
        match method {
            "workspace/configuration" => {
                protocol::success_response(id, protocol::configuration_result(params))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => protocol::success_response(id, Value::Null),
            _ => {
                tracing::debug!(method, "Server request not supported; replying method not found");
                protocol::error_response(
                    id,
                    protocol::METHOD_NOT_FOUND,
                    &format!("Method not found: {method}"),
                )
            }
        }
    }

    async fn notification(&self, method: &str, params: Option<Value>) {
        let Some(params) = params else {
            tracing::trace!(client = %self.key, method, "Notification without params");
            return;
        };
        match method {
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(published) => {
                        let Some(path) = protocol::file_uri_to_path(&published.uri) else {
                            tracing::debug!(uri = published.uri, "Diagnostics for non-file URI");
                            return;
                        };
                        let items = published
                            .diagnostics
                            .iter()
                            .map(protocol::LspDiagnostic::to_server_diagnostic)
                            .collect();
                        self.emit(EventKind::Diagnostics { path, items });
                    }
                    Err(e) => tracing::debug!(client = %self.key, "Bad publishDiagnostics: {e}"),
                }
            }
            "window/logMessage" | "window/showMessage" => {
                match serde_json::from_value::<MessageParams>(params) {
                    Ok(msg) => {
                        let level = MessageLevel::from_lsp(msg.level);
                        tracing::info!(client = %self.key, ?level, "{}", msg.message);
                        self.emit(EventKind::Message {
                            level,
                            message: msg.message,
                            show: method == "window/showMessage",
                        });
                    }
                    Err(e) => tracing::debug!(client = %self.key, "Bad {method}: {e}"),
                }
            }
            _ => tracing::trace!(client = %self.key, method, "Ignoring notification"),
        }
    }
}

/// One live JSON-RPC session with a server process.
pub(crate) struct Connection {
    key: ClientKey,
    rpc: RpcChannel,
    child: Option<Child>,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Wire up reader/writer tasks and complete the `initialize` handshake.
    pub async fn establish(
        process: ServerProcess,
        key: ClientKey,
        generation: u64,
        folders: &[WorkspaceFolder],
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self> {
        let ServerProcess {
            stdin,
            stdout,
            child,
        } = process;

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_key = key.clone();
        let writer = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!(client = %writer_key, "Language server write failed: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher {
            key: key.clone(),
            generation,
            pending: Arc::clone(&pending),
            writer_tx: writer_tx.clone(),
            events,
            closing: Arc::clone(&closing),
        };
        let reader = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            let reason = loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => dispatcher.dispatch(&frame).await,
                    Ok(None) => break StopReason::Exited,
                    Err(e) => break StopReason::Failed(format!("{e:#}")),
                }
            };
            tracing::info!(client = %dispatcher.key, generation, ?reason, "Language server stream closed");
            // Fail in-flight requests instead of letting them hit the timeout.
            dispatcher.pending.lock().await.clear();
            if dispatcher.closing.load(Ordering::Acquire) {
                return;
            }
            dispatcher.emit(EventKind::Stopped(reason));
        });

        let connection = Self {
            key,
            rpc: RpcChannel {
                writer_tx,
                pending,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            child,
            closing,
            reader,
            writer,
        };
        if let Err(e) = connection.initialize(folders).await {
            connection.abandon();
            return Err(e);
        }
        Ok(connection)
    }

    async fn initialize(&self, folders: &[WorkspaceFolder]) -> Result<()> {
        let params = protocol::initialize_params(folders);
        match self.rpc.request("initialize", Some(params), REQUEST_TIMEOUT).await {
            Ok(_) => {}
            Err(ClientError::Rpc { message, .. }) => bail!("initialize rejected: {message}"),
            Err(e) => bail!("initialize failed: {e}"),
        }
        self.rpc
            .notify("initialized", Some(serde_json::json!({})))
            .await
            .context("sending initialized")?;
        Ok(())
    }

    pub fn rpc(&self) -> &RpcChannel {
        &self.rpc
    }

    /// `shutdown` → `exit` → wait for the child, killing it if it lingers.
    ///
    /// The reader reports nothing once this begins: a server that exits
    /// because it was asked to has not crashed.
    pub async fn shutdown(mut self) {
        self.closing.store(true, Ordering::Release);
        match self.rpc.request("shutdown", None, SHUTDOWN_TIMEOUT).await {
            Ok(_) => {
                let _ = self.rpc.notify("exit", None).await;
            }
            Err(e) => tracing::debug!(client = %self.key, "shutdown request failed: {e}"),
        }
        let _ = self.rpc.writer_tx.send(WriterCommand::Shutdown).await;
        // Let the writer flush `exit` before the pipe goes away.
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.writer).await;

        if let Some(mut child) = self.child.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait())
                .await
                .is_err()
            {
                tracing::debug!(client = %self.key, "Language server did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
        self.reader.abort();
        self.writer.abort();
    }

    /// Drop a connection whose server is already gone.
    pub fn abandon(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

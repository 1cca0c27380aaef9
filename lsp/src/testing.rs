//! In-memory language server used by the manager tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use kestrel_config::ConfigSnapshot;
use kestrel_toolchain::{Platform, ToolchainInfo};
use kestrel_types::Version;
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::codec::{FrameReader, FrameWriter};
use crate::manager::LanguageClientManager;
use crate::protocol;
use crate::server::{LaunchFut, ServerCommand, ServerLauncher, ServerProcess};

const PIPE_BYTES: usize = 64 * 1024;

enum Control {
    Send(Value),
    Crash,
}

/// Test-side view of one launched fake server.
#[derive(Clone)]
pub(crate) struct FakeServer {
    received: Arc<Mutex<Vec<Value>>>,
    control: mpsc::UnboundedSender<Control>,
}

impl FakeServer {
    /// Close the server's output as if the process died.
    pub fn crash(&self) {
        let _ = self.control.send(Control::Crash);
    }

    /// Push a server-initiated message to the client.
    pub fn push(&self, frame: Value) {
        let _ = self.control.send(Control::Send(frame));
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|f| f["method"].as_str().map(String::from))
            .collect()
    }

    pub fn frames(&self, method: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|f| f["method"] == method)
            .collect()
    }
}

#[derive(Default)]
pub(crate) struct FakeLauncher {
    commands: Mutex<Vec<ServerCommand>>,
    servers: Mutex<Vec<FakeServer>>,
    failing: AtomicBool,
    /// Requests that servers receive but never answer.
    ignored: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following launch fail.
    pub fn fail_launches(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Leave every following `method` request unanswered.
    pub fn ignore(&self, method: &str) {
        self.ignored.lock().unwrap().push(method.to_string());
    }

    pub fn commands(&self) -> Vec<ServerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    pub fn server(&self, index: usize) -> FakeServer {
        self.servers.lock().unwrap()[index].clone()
    }
}

impl ServerLauncher for FakeLauncher {
    fn launch<'a>(&'a self, command: &'a ServerCommand) -> LaunchFut<'a> {
        Box::pin(async move {
            self.commands.lock().unwrap().push(command.clone());
            if self.failing.load(Ordering::SeqCst) {
                bail!("failed to spawn {}", command.program.display());
            }

            let (client_stdin, server_stdin) = tokio::io::duplex(PIPE_BYTES);
            let (server_stdout, client_stdout) = tokio::io::duplex(PIPE_BYTES);
            let (control, control_rx) = mpsc::unbounded_channel();
            let server = FakeServer {
                received: Arc::new(Mutex::new(Vec::new())),
                control,
            };
            tokio::spawn(serve(
                server_stdin,
                server_stdout,
                Arc::clone(&server.received),
                Arc::clone(&self.ignored),
                control_rx,
            ));
            self.servers.lock().unwrap().push(server);

            Ok(ServerProcess {
                stdin: Box::new(client_stdin),
                stdout: Box::new(client_stdout),
                child: None,
            })
        })
    }
}

fn reply(frame: &Value, method: &str) -> Value {
    let id = &frame["id"];
    match method {
        "initialize" => protocol::success_response(
            id,
            json!({ "capabilities": { "completionProvider": {}, "definitionProvider": true } }),
        ),
        "shutdown" => protocol::success_response(id, Value::Null),
        "textDocument/completion" => protocol::success_response(
            id,
            json!({ "isIncomplete": false, "items": [{ "label": "print(_:separator:terminator:)" }] }),
        ),
        "textDocument/definition" => protocol::success_response(id, json!([])),
        other => protocol::error_response(
            id,
            protocol::METHOD_NOT_FOUND,
            &format!("Method not found: {other}"),
        ),
    }
}

async fn serve(
    stdin: DuplexStream,
    stdout: DuplexStream,
    received: Arc<Mutex<Vec<Value>>>,
    ignored: Arc<Mutex<Vec<String>>>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    // Frames are read on their own task so the select below stays cancel-safe.
    let (frames_tx, mut frames) = mpsc::unbounded_channel();
    let reader = tokio::spawn(async move {
        let mut reader = FrameReader::new(stdin);
        while let Ok(Some(frame)) = reader.read_frame().await {
            if frames_tx.send(frame).is_err() {
                break;
            }
        }
    });

    let mut writer = FrameWriter::new(stdout);
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                received.lock().unwrap().push(frame.clone());
                let method = frame["method"].as_str().unwrap_or_default().to_string();
                if frame.get("id").is_some() && !method.is_empty() {
                    if ignored.lock().unwrap().contains(&method) {
                        continue;
                    }
                    if writer.write_frame(&reply(&frame, &method)).await.is_err() {
                        break;
                    }
                } else if method == "exit" {
                    break;
                }
            }
            cmd = control.recv() => match cmd {
                Some(Control::Send(frame)) => {
                    if writer.write_frame(&frame).await.is_err() {
                        break;
                    }
                }
                Some(Control::Crash) | None => break,
            },
        }
    }
    reader.abort();
}

pub(crate) fn toolchain() -> ToolchainInfo {
    ToolchainInfo {
        swift_folder_path: PathBuf::from("/opt/swift/usr/bin"),
        toolchain_path: PathBuf::from("/opt/swift"),
        compiler_version: "Swift version 5.10 (swift-5.10-RELEASE)".to_string(),
        version: Version::new(5, 10, 0),
        runtime_path: None,
        default_target: Some("x86_64-unknown-linux-gnu".to_string()),
        default_sdk: None,
        xctest_path: None,
        platform: Platform::Unix,
    }
}

pub(crate) fn config() -> ConfigSnapshot {
    ConfigSnapshot::default()
}

/// Poll the manager until `done` holds.
pub(crate) async fn settle(
    manager: &mut LanguageClientManager,
    mut done: impl FnMut(&LanguageClientManager) -> bool,
) {
    for _ in 0..400 {
        manager.poll_events(64).await;
        if done(manager) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("manager did not reach the expected state");
}

/// Wait until `done` holds without polling any manager.
pub(crate) async fn eventually(mut done: impl FnMut() -> bool) {
    for _ in 0..400 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never held");
}

//! Scripted in-memory language server for extension tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kestrel_lsp::codec::{FrameReader, FrameWriter};
use kestrel_lsp::{LaunchFut, ServerCommand, ServerLauncher, ServerProcess};
use kestrel_toolchain::{Platform, ToolchainInfo};
use kestrel_types::Version;
use serde_json::{Value, json};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

#[derive(Default)]
pub(crate) struct ScriptedLauncher {
    launches: Mutex<usize>,
    methods: Arc<Mutex<Vec<String>>>,
    kill_switches: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock().unwrap()
    }

    /// Methods received by every server launched so far, in arrival order.
    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    /// Close the most recent server's output.
    pub fn crash_latest(&self) {
        if let Some(kill) = self.kill_switches.lock().unwrap().last() {
            let _ = kill.send(());
        }
    }
}

impl ServerLauncher for ScriptedLauncher {
    fn launch<'a>(&'a self, _command: &'a ServerCommand) -> LaunchFut<'a> {
        Box::pin(async move {
            *self.launches.lock().unwrap() += 1;
            let (client_stdin, server_stdin) = tokio::io::duplex(64 * 1024);
            let (server_stdout, client_stdout) = tokio::io::duplex(64 * 1024);
            let (kill, killed) = mpsc::unbounded_channel();
            self.kill_switches.lock().unwrap().push(kill);
            tokio::spawn(serve(
                server_stdin,
                server_stdout,
                Arc::clone(&self.methods),
                killed,
            ));
            Ok(ServerProcess {
                stdin: Box::new(client_stdin),
                stdout: Box::new(client_stdout),
                child: None,
            })
        })
    }
}

fn answer(method: &str) -> Value {
    match method {
        "initialize" => json!({ "capabilities": {} }),
        "textDocument/completion" => json!({ "isIncomplete": false, "items": [] }),
        _ => Value::Null,
    }
}

async fn serve(
    stdin: DuplexStream,
    stdout: DuplexStream,
    methods: Arc<Mutex<Vec<String>>>,
    mut killed: mpsc::UnboundedReceiver<()>,
) {
    let (frames_tx, mut frames) = mpsc::unbounded_channel::<Value>();
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
                let method = frame["method"].as_str().unwrap_or_default().to_string();
                methods.lock().unwrap().push(method.clone());
                if let Some(id) = frame.get("id") {
                    let reply = json!({ "jsonrpc": "2.0", "id": id, "result": answer(&method) });
                    if writer.write_frame(&reply).await.is_err() {
                        break;
                    }
                } else if method == "exit" {
                    break;
                }
            }
            _ = killed.recv() => break,
        }
    }
    reader.abort();
}

pub(crate) fn toolchain() -> ToolchainInfo {
    ToolchainInfo {
        swift_folder_path: PathBuf::from("/opt/swift/usr/bin"),
        toolchain_path: PathBuf::from("/opt/swift"),
        compiler_version: "Swift version 6.0.3 (swift-6.0.3-RELEASE)".to_string(),
        version: Version::new(6, 0, 3),
        runtime_path: None,
        default_target: Some("x86_64-unknown-linux-gnu".to_string()),
        default_sdk: None,
        xctest_path: None,
        platform: Platform::Unix,
    }
}

//! One language server and the client-side state that outlives its process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use url::Url;

use crate::protocol;
use crate::server::{
    Connection, ConnectionEvent, REQUEST_TIMEOUT, RpcChannel, ServerCommand, ServerLauncher,
};
use crate::types::{ClientError, ClientKey, ClientState, WorkspaceFolder};

/// Language id used when a document changes before the host opened it.
const DEFAULT_LANGUAGE_ID: &str = "swift";

/// How many times a crashed server is restarted before giving up.
const MAX_RESTARTS: u32 = 1;

#[derive(Debug)]
struct OpenDocument {
    language_id: String,
    version: i32,
    text: String,
}

#[derive(Default)]
struct HandleInner {
    connection: Option<Connection>,
    generation: u64,
    restarts: u32,
    folders: Vec<WorkspaceFolder>,
    /// Replayed with `didOpen` whenever a new connection comes up.
    documents: BTreeMap<String, OpenDocument>,
}

/// What the manager should do about a reader that stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CrashOutcome {
    /// Event from a connection that has already been replaced or stopped.
    Stale,
    Restart,
    GiveUp,
}

/// Owns at most one server connection at a time.
///
/// Every start/stop/restart transition holds the inner async mutex for its
/// whole duration, so transitions on one handle never interleave. The state
/// itself lives in a `watch` channel and can be read without waiting.
pub struct LanguageClientHandle {
    key: ClientKey,
    command: ServerCommand,
    /// Shared by every handle of a manager, so a generation is never reused
    /// even when a key is.
    generations: Arc<AtomicU64>,
    state: watch::Sender<ClientState>,
    inner: Mutex<HandleInner>,
}

impl LanguageClientHandle {
    pub(crate) fn new(
        key: ClientKey,
        command: ServerCommand,
        folders: Vec<WorkspaceFolder>,
        generations: Arc<AtomicU64>,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::Stopped);
        Self {
            key,
            command,
            generations,
            state,
            inner: Mutex::new(HandleInner {
                folders,
                ..HandleInner::default()
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    #[must_use]
    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ClientState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(client = %self.key, from = %previous, to = %next, "Language client state");
        }
    }

    /// Launch the server and complete the handshake. A caller that finds the
    /// handle already running after acquiring the lock returns immediately.
    pub(crate) async fn start(
        &self,
        launcher: &dyn ServerLauncher,
        events: &mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if self.state() == ClientState::Running {
            return Ok(());
        }
        if let Some(old) = inner.connection.take() {
            old.abandon();
        }

        self.set_state(ClientState::Starting);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        inner.generation = generation;
        tracing::info!(
            client = %self.key,
            program = %self.command.program.display(),
            args = ?self.command.args,
            generation,
            "Starting language server"
        );

        let established = async {
            let process = launcher.launch(&self.command).await?;
            let connection = Connection::establish(
                process,
                self.key.clone(),
                generation,
                &inner.folders,
                events.clone(),
            )
            .await?;
            for (uri, doc) in &inner.documents {
                let params = protocol::did_open_params(uri, &doc.language_id, doc.version, &doc.text);
                connection
                    .rpc()
                    .notify("textDocument/didOpen", Some(params))
                    .await?;
            }
            anyhow::Ok(connection)
        }
        .await;

        match established {
            Ok(connection) => {
                inner.connection = Some(connection);
                self.set_state(ClientState::Running);
                tracing::info!(client = %self.key, generation, "Language server running");
                Ok(())
            }
            Err(e) => {
                self.set_state(ClientState::Stopped);
                Err(e)
            }
        }
    }

    /// Decide what to do about a stopped reader from `generation`.
    ///
    /// `Restart` leaves the handle `Restarting`; `GiveUp` leaves it `Stopped`.
    pub(crate) async fn crashed(&self, generation: u64) -> CrashOutcome {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || self.state() != ClientState::Running {
            return CrashOutcome::Stale;
        }
        if let Some(dead) = inner.connection.take() {
            dead.abandon();
        }
        if inner.restarts < MAX_RESTARTS {
            inner.restarts += 1;
            self.set_state(ClientState::Restarting);
            CrashOutcome::Restart
        } else {
            self.set_state(ClientState::Stopped);
            CrashOutcome::GiveUp
        }
    }

    /// Graceful teardown. Safe to call in any state.
    pub(crate) async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        let connection = inner.connection.take();
        self.set_state(ClientState::Stopped);
        if let Some(connection) = connection {
            tracing::info!(client = %self.key, "Stopping language server");
            connection.shutdown().await;
        }
    }

    fn not_running(&self, state: ClientState) -> ClientError {
        ClientError::NotRunning {
            client: self.key.to_string(),
            state,
        }
    }

    /// Channel of the live connection. Rejects immediately unless `Running`.
    async fn channel(&self) -> Result<RpcChannel, ClientError> {
        let state = self.state();
        if state != ClientState::Running {
            return Err(self.not_running(state));
        }
        let inner = self.inner.lock().await;
        inner
            .connection
            .as_ref()
            .map(|c| c.rpc().clone())
            .ok_or_else(|| self.not_running(self.state()))
    }

    /// Send a request and wait for its result. A timeout or an error reply
    /// fails this call only; the connection stays up.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let rpc = self.channel().await?;
        rpc.request(method, params, REQUEST_TIMEOUT).await
    }

    /// Fire-and-forget notification. Unlike the document methods, nothing is
    /// remembered when the server is not running.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        let rpc = self.channel().await?;
        rpc.notify(method, params).await
    }

    /// `textDocument/completion` at a zero-based position.
    pub async fn completion(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Value, ClientError> {
        let params = protocol::text_document_position(uri, line, character);
        self.request("textDocument/completion", Some(params)).await
    }

    /// `textDocument/definition` at a zero-based position.
    pub async fn definition(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Value, ClientError> {
        let params = protocol::text_document_position(uri, line, character);
        self.request("textDocument/definition", Some(params)).await
    }

    /// Send on the live connection, if any. Document and folder bookkeeping
    /// happens regardless, so a later start replays it.
    async fn send_if_running(
        &self,
        inner: &HandleInner,
        method: &str,
        params: Value,
    ) -> Result<(), ClientError> {
        match (&inner.connection, self.state()) {
            (Some(connection), ClientState::Running) => {
                connection.rpc().notify(method, Some(params)).await
            }
            _ => {
                tracing::debug!(client = %self.key, method, "Not running; notification deferred");
                Ok(())
            }
        }
    }

    /// Track the document at version 1 and announce it if running.
    pub async fn did_open(&self, uri: &str, language_id: &str, text: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        inner.documents.insert(
            uri.to_string(),
            OpenDocument {
                language_id: language_id.to_string(),
                version: 1,
                text: text.to_string(),
            },
        );
        let params = protocol::did_open_params(uri, language_id, 1, text);
        self.send_if_running(&inner, "textDocument/didOpen", params)
            .await
    }

    /// Full-text change. Unknown documents are opened first.
    pub async fn did_change(&self, uri: &str, text: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        let version = inner.documents.get_mut(uri).map(|doc| {
            doc.version += 1;
            doc.text = text.to_string();
            doc.version
        });
        let Some(version) = version else {
            drop(inner);
            return self.did_open(uri, DEFAULT_LANGUAGE_ID, text).await;
        };
        let params = protocol::did_change_params(uri, version, text);
        self.send_if_running(&inner, "textDocument/didChange", params)
            .await
    }

    /// Stop tracking the document. Closing an unknown document is a no-op.
    pub async fn did_close(&self, uri: &str) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.documents.remove(uri).is_none() {
            tracing::debug!(client = %self.key, uri, "didClose for a document that was never opened");
            return Ok(());
        }
        self.send_if_running(&inner, "textDocument/didClose", protocol::did_close_params(uri))
            .await
    }

    pub(crate) async fn add_folder(&self, folder: WorkspaceFolder) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        if inner.folders.iter().any(|f| f.uri == folder.uri) {
            return Ok(());
        }
        let params = protocol::did_change_workspace_folders(std::slice::from_ref(&folder), &[]);
        inner.folders.push(folder);
        self.send_if_running(&inner, "workspace/didChangeWorkspaceFolders", params)
            .await
    }

    pub(crate) async fn remove_folder(&self, uri: &Url) -> Result<(), ClientError> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.folders.iter().position(|f| &f.uri == uri) else {
            return Ok(());
        };
        let removed = inner.folders.remove(index);
        let params = protocol::did_change_workspace_folders(&[], std::slice::from_ref(&removed));
        self.send_if_running(&inner, "workspace/didChangeWorkspaceFolders", params)
            .await
    }

    /// Folders announced to the server, or to be announced on next start.
    pub async fn folders(&self) -> Vec<WorkspaceFolder> {
        self.inner.lock().await.folders.clone()
    }

    /// Whether diagnostics for `path` belong to this client. A client without
    /// folders serves loose files and accepts everything.
    pub(crate) async fn accepts(&self, path: &Path) -> bool {
        let inner = self.inner.lock().await;
        inner.folders.is_empty() || inner.folders.iter().any(|f| f.contains(path))
    }

    pub(crate) async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }
}

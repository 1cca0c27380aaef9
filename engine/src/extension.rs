//! Activation boundary: configuration, discovery, workspace and language
//! client wired together, driven by host events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kestrel_config::{ConfigSnapshot, read_configuration, read_configuration_from};
use kestrel_lsp::{
    ClientError, LanguageClientHandle, LanguageClientManager, ManagerObserver, ProcessLauncher,
    ServerLauncher,
};
use kestrel_toolchain::{ToolchainError, ToolchainInfo, ToolchainLocator};
use kestrel_workspace::{ObserverRegistration, WorkspaceContext};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use url::Url;

use crate::host::{HostEvent, HostMessage};

/// A request that is answered asynchronously through the outbox.
enum Call {
    Completion { line: u32, character: u32 },
    Definition { line: u32, character: u32 },
    Raw { method: String, params: Option<Value> },
}

impl Call {
    async fn run(self, handle: &LanguageClientHandle, uri: &Url) -> Result<Value, ClientError> {
        match self {
            Self::Completion { line, character } => {
                handle.completion(uri.as_str(), line, character).await
            }
            Self::Definition { line, character } => {
                handle.definition(uri.as_str(), line, character).await
            }
            Self::Raw { method, params } => handle.request(&method, params).await,
        }
    }
}

pub struct Extension {
    /// `None` reads the default `~/.kestrel/config.toml`.
    config_path: Option<PathBuf>,
    workspace: WorkspaceContext,
    pub(crate) manager: Arc<Mutex<LanguageClientManager>>,
    registration: ObserverRegistration,
    pub(crate) outbox_tx: mpsc::UnboundedSender<HostMessage>,
    pub(crate) outbox_rx: mpsc::UnboundedReceiver<HostMessage>,
}

fn load_config(path: Option<&Path>) -> ConfigSnapshot {
    path.map_or_else(read_configuration, read_configuration_from)
}

impl Extension {
    /// Read configuration, locate the toolchain and start the language
    /// client. A toolchain that cannot be found aborts activation.
    pub async fn activate(config_path: Option<PathBuf>) -> Result<Self, ToolchainError> {
        let config = load_config(config_path.as_deref());
        let toolchain = ToolchainLocator::new(&config).locate().await?;
        tracing::info!(
            version = %toolchain.version,
            toolchain = %toolchain.toolchain_path.display(),
            "Toolchain located"
        );
        Ok(Self::with_toolchain(config_path, config, toolchain, Arc::new(ProcessLauncher)).await)
    }

    /// Activation with discovery already done.
    pub async fn with_toolchain(
        config_path: Option<PathBuf>,
        config: ConfigSnapshot,
        toolchain: ToolchainInfo,
        launcher: Arc<dyn ServerLauncher>,
    ) -> Self {
        let workspace = WorkspaceContext::new(toolchain.clone(), config.clone());
        let manager =
            LanguageClientManager::start(config, toolchain, workspace.folders(), launcher).await;
        let manager = Arc::new(Mutex::new(manager));
        let registration =
            workspace.observe(Arc::new(ManagerObserver::new(Arc::clone(&manager))));
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

        Self {
            config_path,
            workspace,
            manager,
            registration,
            outbox_tx,
            outbox_rx,
        }
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceContext {
        &self.workspace
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<Mutex<LanguageClientManager>> {
        &self.manager
    }

    fn send(&self, message: HostMessage) {
        if self.outbox_tx.send(message).is_err() {
            tracing::debug!("Host outbox closed");
        }
    }

    /// Apply one host event. Replies are queued and come out of `tick()`.
    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::AddFolder { uri, name } => {
                if let Err(e) = self.workspace.add_folder(uri, name).await {
                    tracing::warn!("Cannot add folder: {e}");
                    self.send(HostMessage::Error {
                        message: e.to_string(),
                    });
                }
            }
            HostEvent::RemoveFolder { uri } => {
                if let Err(e) = self.workspace.remove_folder(&uri).await {
                    tracing::warn!("Ignoring folder removal: {e}");
                }
            }
            HostEvent::ActiveDocument { uri } => {
                let path = uri.and_then(|uri| uri.to_file_path().ok());
                self.workspace.focus_document(path.as_deref()).await;
            }
            HostEvent::ConfigurationChanged => {
                let next = load_config(self.config_path.as_deref());
                self.manager.lock().await.on_configuration_changed(&next);
            }
            HostEvent::DidOpen {
                uri,
                language_id,
                text,
            } => {
                let sent = self
                    .manager
                    .lock()
                    .await
                    .did_open(&uri, &language_id, &text)
                    .await;
                log_notification("didOpen", &uri, sent);
            }
            HostEvent::DidChange { uri, text } => {
                let sent = self.manager.lock().await.did_change(&uri, &text).await;
                log_notification("didChange", &uri, sent);
            }
            HostEvent::DidClose { uri } => {
                let sent = self.manager.lock().await.did_close(&uri).await;
                log_notification("didClose", &uri, sent);
            }
            HostEvent::Completion {
                id,
                uri,
                line,
                character,
            } => self.dispatch(id, uri, Call::Completion { line, character }).await,
            HostEvent::Definition {
                id,
                uri,
                line,
                character,
            } => self.dispatch(id, uri, Call::Definition { line, character }).await,
            HostEvent::Request {
                id,
                uri,
                method,
                params,
            } => self.dispatch(id, uri, Call::Raw { method, params }).await,
            HostEvent::Diagnostics { id } => {
                let snapshot = self.manager.lock().await.snapshot();
                tracing::debug!(
                    errors = snapshot.error_count(),
                    warnings = snapshot.warning_count(),
                    total = snapshot.total_count(),
                    "Diagnostics requested"
                );
                self.send(HostMessage::diagnostics(id, &snapshot));
            }
        }
    }

    /// Route a request and answer it from a spawned task, so a slow server
    /// never holds the manager lock.
    async fn dispatch(&self, id: u64, uri: Url, call: Call) {
        let routed = self.manager.lock().await.client_for(&uri);
        let handle = match routed {
            Ok(handle) => handle,
            Err(e) => {
                self.send(HostMessage::failure(id, &e));
                return;
            }
        };
        let outbox = self.outbox_tx.clone();
        tokio::spawn(async move {
            let outcome = call.run(&handle, &uri).await;
            let _ = outbox.send(HostMessage::reply(id, outcome));
        });
    }

    /// Tear everything down: observers first, then folders, then servers.
    pub async fn deactivate(self) {
        let Self {
            workspace,
            manager,
            registration,
            ..
        } = self;
        registration.dispose();
        workspace.dispose().await;
        manager.lock().await.shutdown().await;
        tracing::info!("Extension deactivated");
    }
}

fn log_notification(method: &str, uri: &Url, sent: Result<(), ClientError>) {
    match sent {
        Ok(()) => {}
        Err(ClientError::NoServer { .. }) => {
            tracing::debug!(%uri, method, "No language server for document");
        }
        Err(e) => tracing::warn!(%uri, method, "Notification failed: {e}"),
    }
}

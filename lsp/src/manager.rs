//! `LanguageClientManager`: the public face of the language client.
//!
//! Construction is initialization: `start()` launches whatever the
//! configuration asks for. Afterwards the manager reacts to folder events,
//! routes document traffic to the right handle and drains connection events
//! with `poll_events()`, restarting a crashed server once.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use kestrel_config::{ConfigSnapshot, ServerScope};
use kestrel_toolchain::ToolchainInfo;
use kestrel_workspace::FolderContext;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::diagnostics::DiagnosticsStore;
use crate::handle::{CrashOutcome, LanguageClientHandle};
use crate::server::{ConnectionEvent, EventKind, ServerCommand, ServerLauncher, StopReason};
use crate::types::{
    ClientError, ClientKey, ClientNotice, ClientState, DiagnosticsSnapshot, WorkspaceFolder,
};

/// Executable looked up in the toolchain when no server path is configured.
pub const SERVER_EXECUTABLE: &str = "sourcekit-lsp";

/// Program, arguments and working directory for a server.
///
/// `cwd` is the folder path for folder-scoped servers and `None` for the
/// shared one.
#[must_use]
pub fn resolve_server_command(
    config: &ConfigSnapshot,
    toolchain: &ToolchainInfo,
    cwd: Option<&Path>,
) -> ServerCommand {
    let program = config.server_path().map_or_else(
        || toolchain.toolchain_executable(SERVER_EXECUTABLE),
        Path::to_path_buf,
    );
    ServerCommand {
        program,
        args: config.server_arguments().to_vec(),
        cwd: cwd.map(Path::to_path_buf),
    }
}

fn workspace_folder(folder: &FolderContext) -> WorkspaceFolder {
    WorkspaceFolder {
        uri: folder.uri().clone(),
        name: folder.name().to_string(),
        path: folder.path().to_path_buf(),
    }
}

pub struct LanguageClientManager {
    /// Settings in effect since `start`. Later changes only produce notices.
    config: ConfigSnapshot,
    toolchain: ToolchainInfo,
    launcher: Arc<dyn ServerLauncher>,
    clients: HashMap<ClientKey, Arc<LanguageClientHandle>>,
    /// Connection generations for every handle this manager creates.
    generations: Arc<AtomicU64>,
    /// Known folders in the order they were added.
    folders: Vec<WorkspaceFolder>,
    focused: Option<Url>,
    diagnostics: DiagnosticsStore,
    notices: VecDeque<ClientNotice>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl LanguageClientManager {
    /// Build the manager and start its servers.
    ///
    /// A server that fails to start is kept as a `Stopped` handle and
    /// reported through a `StartFailed` notice.
    pub async fn start(
        config: ConfigSnapshot,
        toolchain: ToolchainInfo,
        folders: &[Arc<FolderContext>],
        launcher: Arc<dyn ServerLauncher>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut manager = Self {
            config,
            toolchain,
            launcher,
            clients: HashMap::new(),
            generations: Arc::default(),
            folders: folders.iter().map(|f| workspace_folder(f)).collect(),
            focused: None,
            diagnostics: DiagnosticsStore::default(),
            notices: VecDeque::new(),
            event_rx,
            event_tx,
        };

        if manager.config.disable() {
            tracing::info!("Language server disabled by configuration");
            return manager;
        }

        match manager.config.scope() {
            ServerScope::Shared => {
                let folders = manager.folders.clone();
                manager.start_client(ClientKey::Shared, folders, None).await;
            }
            ServerScope::Folder => {
                for folder in manager.folders.clone() {
                    let cwd = folder.path.clone();
                    manager
                        .start_client(ClientKey::Folder(folder.uri.clone()), vec![folder], Some(cwd))
                        .await;
                }
            }
        }
        manager
    }

    async fn start_client(
        &mut self,
        key: ClientKey,
        folders: Vec<WorkspaceFolder>,
        cwd: Option<PathBuf>,
    ) {
        let command = resolve_server_command(&self.config, &self.toolchain, cwd.as_deref());
        let handle = Arc::new(LanguageClientHandle::new(
            key.clone(),
            command,
            folders,
            Arc::clone(&self.generations),
        ));
        self.clients.insert(key, Arc::clone(&handle));
        self.start_handle(&handle).await;
    }

    async fn start_handle(&mut self, handle: &LanguageClientHandle) {
        if let Err(e) = handle.start(self.launcher.as_ref(), &self.event_tx).await {
            tracing::warn!(client = %handle.key(), "Failed to start language server: {e:#}");
            self.notices.push_back(ClientNotice::StartFailed {
                client: handle.key().to_string(),
                error: format!("{e:#}"),
            });
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    #[must_use]
    pub fn client(&self, key: &ClientKey) -> Option<&Arc<LanguageClientHandle>> {
        self.clients.get(key)
    }

    /// Every handle with its current state, shared first then by folder URI.
    #[must_use]
    pub fn client_states(&self) -> Vec<(ClientKey, ClientState)> {
        let mut states: Vec<_> = self
            .clients
            .iter()
            .map(|(key, handle)| (key.clone(), handle.state()))
            .collect();
        states.sort_by(|(a, _), (b, _)| match (a, b) {
            (ClientKey::Shared, ClientKey::Shared) => Ordering::Equal,
            (ClientKey::Shared, _) => Ordering::Less,
            (_, ClientKey::Shared) => Ordering::Greater,
            (ClientKey::Folder(a), ClientKey::Folder(b)) => a.as_str().cmp(b.as_str()),
        });
        states
    }

    /// Announce a new folder to the shared server, or start its own server
    /// in folder scope.
    pub async fn folder_added(&mut self, folder: &FolderContext) {
        let folder = workspace_folder(folder);
        if self.folders.iter().any(|f| f.uri == folder.uri) {
            tracing::debug!(folder = %folder.uri, "Folder already known to the language client");
            return;
        }
        self.folders.push(folder.clone());
        if self.config.disable() {
            return;
        }

        match self.config.scope() {
            ServerScope::Shared => {
                if let Some(handle) = self.clients.get(&ClientKey::Shared) {
                    if let Err(e) = handle.add_folder(folder).await {
                        tracing::warn!(client = %handle.key(), "Failed to announce folder: {e}");
                    }
                }
            }
            ServerScope::Folder => {
                let key = ClientKey::Folder(folder.uri.clone());
                let cwd = folder.path.clone();
                self.start_client(key, vec![folder], Some(cwd)).await;
            }
        }
    }

    /// Forget a folder and its diagnostics. In shared scope the server stays
    /// up even when the last folder goes; in folder scope the folder's server
    /// is stopped.
    pub async fn folder_removed(&mut self, uri: &Url) {
        let Some(index) = self.folders.iter().position(|f| &f.uri == uri) else {
            tracing::debug!(folder = %uri, "Removal of a folder the language client never saw");
            return;
        };
        let removed = self.folders.remove(index);
        if self.focused.as_ref() == Some(uri) {
            self.focused = None;
        }

        match self.config.scope() {
            ServerScope::Shared => {
                if let Some(handle) = self.clients.get(&ClientKey::Shared) {
                    if let Err(e) = handle.remove_folder(uri).await {
                        tracing::warn!(client = %handle.key(), "Failed to withdraw folder: {e}");
                    }
                }
            }
            ServerScope::Folder => {
                if let Some(handle) = self.clients.remove(&ClientKey::Folder(uri.clone())) {
                    handle.stop().await;
                }
            }
        }
        let cleared = self.diagnostics.clear_under(&removed.path);
        tracing::debug!(folder = %uri, cleared, "Folder removed from the language client");
    }

    /// Folder that receives documents outside every known folder.
    pub fn folder_focused(&mut self, uri: Option<&Url>) {
        self.focused = uri.cloned();
    }

    #[must_use]
    pub fn focused(&self) -> Option<&Url> {
        self.focused.as_ref()
    }

    /// Handle responsible for `document`.
    ///
    /// Folder scope picks the innermost folder containing the document and
    /// falls back to the focused folder.
    pub fn client_for(&self, document: &Url) -> Result<Arc<LanguageClientHandle>, ClientError> {
        let no_server = || ClientError::NoServer {
            uri: document.clone(),
        };
        let key = match self.config.scope() {
            ServerScope::Shared => ClientKey::Shared,
            ServerScope::Folder => {
                let path = document.to_file_path().ok();
                let owner = path.as_deref().and_then(|path| {
                    self.folders
                        .iter()
                        .filter(|f| f.contains(path))
                        .max_by_key(|f| f.path.components().count())
                });
                match owner.map(|f| &f.uri).or(self.focused.as_ref()) {
                    Some(uri) => ClientKey::Folder(uri.clone()),
                    None => return Err(no_server()),
                }
            }
        };
        self.clients.get(&key).cloned().ok_or_else(no_server)
    }

    /// Arbitrary request on the server responsible for `document`.
    pub async fn request(
        &self,
        document: &Url,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.client_for(document)?.request(method, params).await
    }

    pub async fn notify(
        &self,
        document: &Url,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        self.client_for(document)?.notify(method, params).await
    }

    /// Completion items at a zero-based position, as the server returns them.
    pub async fn completion(
        &self,
        document: &Url,
        line: u32,
        character: u32,
    ) -> Result<Value, ClientError> {
        self.client_for(document)?
            .completion(document.as_str(), line, character)
            .await
    }

    pub async fn definition(
        &self,
        document: &Url,
        line: u32,
        character: u32,
    ) -> Result<Value, ClientError> {
        self.client_for(document)?
            .definition(document.as_str(), line, character)
            .await
    }

    /// Document notifications are remembered by the handle and replayed
    /// after a restart, so they succeed even while the server is down.
    pub async fn did_open(
        &self,
        document: &Url,
        language_id: &str,
        text: &str,
    ) -> Result<(), ClientError> {
        self.client_for(document)?
            .did_open(document.as_str(), language_id, text)
            .await
    }

    pub async fn did_change(&self, document: &Url, text: &str) -> Result<(), ClientError> {
        self.client_for(document)?
            .did_change(document.as_str(), text)
            .await
    }

    pub async fn did_close(&self, document: &Url) -> Result<(), ClientError> {
        self.client_for(document)?.did_close(document.as_str()).await
    }

    /// Drain up to `budget` connection events. Returns immediately when the
    /// queue is empty.
    pub async fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            let Ok(event) = self.event_rx.try_recv() else {
                break;
            };
            self.handle_event(event).await;
            count += 1;
        }
        count
    }

    async fn handle_event(&mut self, event: ConnectionEvent) {
        let ConnectionEvent {
            key,
            generation,
            kind,
        } = event;
        let Some(handle) = self.clients.get(&key).cloned() else {
            tracing::trace!(client = %key, "Event for a client that no longer exists");
            return;
        };

        match kind {
            EventKind::Diagnostics { path, items } => {
                if handle.generation().await != generation {
                    tracing::trace!(client = %key, generation, "Stale diagnostics");
                    return;
                }
                if !handle.accepts(&path).await {
                    tracing::debug!(
                        client = %key,
                        path = %path.display(),
                        "Diagnostics outside the client's folders ignored"
                    );
                    return;
                }
                tracing::debug!(path = %path.display(), count = items.len(), "Diagnostics updated");
                self.diagnostics.update(path, items);
            }
            EventKind::Message {
                level,
                message,
                show,
            } => {
                self.notices.push_back(ClientNotice::ServerMessage {
                    client: key.to_string(),
                    level,
                    message,
                    show,
                });
            }
            EventKind::Stopped(reason) => match handle.crashed(generation).await {
                CrashOutcome::Stale => {
                    tracing::trace!(client = %key, generation, "Stop of a retired connection");
                }
                CrashOutcome::Restart => {
                    match &reason {
                        StopReason::Exited => {
                            tracing::warn!(client = %key, "Language server exited; restarting");
                        }
                        StopReason::Failed(msg) => {
                            tracing::warn!(client = %key, error = %msg, "Language server failed; restarting");
                        }
                    }
                    self.start_handle(&handle).await;
                }
                CrashOutcome::GiveUp => {
                    tracing::error!(client = %key, ?reason, "Language server crashed again; giving up");
                    self.notices.push_back(ClientNotice::ServerCrashed {
                        client: key.to_string(),
                    });
                }
            },
        }
    }

    /// Notices accumulated since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<ClientNotice> {
        self.notices.drain(..).collect()
    }

    /// Compare `next` with the settings in effect. Nothing restarts; a
    /// `ReloadRequired` notice lists what changed. Returns whether one was
    /// pushed.
    pub fn on_configuration_changed(&mut self, next: &ConfigSnapshot) -> bool {
        let changed = self.config.reload_required(next);
        if changed.is_empty() {
            return false;
        }
        tracing::info!(settings = ?changed, "Language server settings changed; reload required");
        self.notices.push_back(ClientNotice::ReloadRequired {
            settings: changed.into_iter().map(String::from).collect(),
        });
        true
    }

    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Stop every server gracefully.
    pub async fn shutdown(&mut self) {
        for (key, handle) in std::mem::take(&mut self.clients) {
            tracing::info!(client = %key, "Shutting down language client");
            handle.stop().await;
        }
        self.diagnostics.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeLauncher, config, eventually, settle, toolchain};
    use kestrel_types::DiagnosticSeverity;
    use kestrel_workspace::WorkspaceContext;

    fn url(path: &str) -> Url {
        Url::from_file_path(path).unwrap()
    }

    fn state(manager: &LanguageClientManager, key: &ClientKey) -> Option<ClientState> {
        manager.client(key).map(|h| h.state())
    }

    async fn workspace(paths: &[&str], config: &ConfigSnapshot) -> WorkspaceContext {
        let mut ws = WorkspaceContext::new(toolchain(), config.clone());
        for path in paths {
            ws.add_folder(url(path), None).await.unwrap();
        }
        ws
    }

    async fn manager_with(
        paths: &[&str],
        config: ConfigSnapshot,
    ) -> (LanguageClientManager, Arc<FakeLauncher>) {
        let ws = workspace(paths, &config).await;
        let launcher = FakeLauncher::new();
        let manager =
            LanguageClientManager::start(config, toolchain(), ws.folders(), launcher.clone()).await;
        (manager, launcher)
    }

    fn publish(path: &str, severity: u64) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": url(path).as_str(),
                "diagnostics": [{
                    "range": { "start": { "line": 1, "character": 4 }, "end": { "line": 1, "character": 9 } },
                    "severity": severity,
                    "source": "sourcekitd",
                    "message": "cannot find 'foo' in scope"
                }]
            }
        })
    }

    #[test]
    fn server_command_from_config() {
        let configured = config()
            .with_server_path("/usr/local/bin/sourcekit-lsp")
            .with_server_arguments(["--log-level", "debug"]);
        let command = resolve_server_command(&configured, &toolchain(), None);
        assert_eq!(command.program, PathBuf::from("/usr/local/bin/sourcekit-lsp"));
        assert_eq!(command.args, vec!["--log-level", "debug"]);
        assert_eq!(command.cwd, None);

        let command = resolve_server_command(&config(), &toolchain(), Some(Path::new("/work/app")));
        assert_eq!(command.program, PathBuf::from("/opt/swift/usr/bin/sourcekit-lsp"));
        assert!(command.args.is_empty());
        assert_eq!(command.cwd, Some(PathBuf::from("/work/app")));
    }

    #[tokio::test]
    async fn shared_server_launched_with_configured_arguments() {
        let configured = config().with_server_arguments(["--log-level", "debug"]);
        let (manager, launcher) = manager_with(&["/work/app"], configured).await;

        assert_eq!(launcher.launches(), 1);
        assert_eq!(launcher.commands()[0].args, vec!["--log-level", "debug"]);
        assert_eq!(state(&manager, &ClientKey::Shared), Some(ClientState::Running));

        let init = &launcher.server(0).frames("initialize")[0];
        assert_eq!(init["params"]["rootUri"], "file:///work/app");
        eventually(|| launcher.server(0).methods().contains(&"initialized".to_string())).await;
    }

    #[tokio::test]
    async fn disabled_server_is_never_launched() {
        let (manager, launcher) =
            manager_with(&["/work/app"], config().with_disable(true)).await;
        assert_eq!(launcher.launches(), 0);
        assert!(manager.client_states().is_empty());

        let err = manager
            .completion(&url("/work/app/main.swift"), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoServer { .. }));
    }

    #[tokio::test]
    async fn completion_is_relayed() {
        let (manager, launcher) = manager_with(&["/work/app"], config()).await;
        let doc = url("/work/app/main.swift");

        let result = manager.completion(&doc, 3, 7).await.unwrap();
        assert_eq!(result["items"][0]["label"], "print(_:separator:terminator:)");

        let sent = &launcher.server(0).frames("textDocument/completion")[0];
        assert_eq!(sent["params"]["position"]["line"], 3);
        assert_eq!(sent["params"]["textDocument"]["uri"], doc.as_str());

        let err = manager
            .request(&doc, "swift/unknownRequest", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32601);
    }

    #[tokio::test]
    async fn crash_restarts_once_then_gives_up() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        let doc = url("/work/app/main.swift");

        launcher.server(0).crash();
        settle(&mut manager, |_| launcher.launches() == 2).await;
        settle(&mut manager, |m| state(m, &ClientKey::Shared) == Some(ClientState::Running)).await;
        assert!(manager.take_notices().is_empty());
        assert!(manager.definition(&doc, 0, 0).await.is_ok());

        launcher.server(1).crash();
        settle(&mut manager, |m| state(m, &ClientKey::Shared) == Some(ClientState::Stopped)).await;
        assert_eq!(launcher.launches(), 2);
        assert_eq!(
            manager.take_notices(),
            vec![ClientNotice::ServerCrashed {
                client: "shared".into()
            }]
        );

        let err = manager.completion(&doc, 0, 0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::NotRunning {
                state: ClientState::Stopped,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_restart_reports_start_failure() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;

        launcher.fail_launches();
        launcher.server(0).crash();
        settle(&mut manager, |_| launcher.launches() == 2).await;

        assert_eq!(state(&manager, &ClientKey::Shared), Some(ClientState::Stopped));
        let notices = manager.take_notices();
        assert!(matches!(
            notices.as_slice(),
            [ClientNotice::StartFailed { client, .. }] if client == "shared"
        ));
    }

    #[tokio::test]
    async fn initial_start_failure_keeps_stopped_handle() {
        let ws = workspace(&["/work/app"], &config()).await;
        let launcher = FakeLauncher::new();
        launcher.fail_launches();
        let mut manager =
            LanguageClientManager::start(config(), toolchain(), ws.folders(), launcher.clone())
                .await;

        assert_eq!(state(&manager, &ClientKey::Shared), Some(ClientState::Stopped));
        assert_eq!(manager.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn open_documents_are_replayed_after_restart() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        let doc = url("/work/app/main.swift");
        manager.did_open(&doc, "swift", "let x = 1").await.unwrap();
        manager.did_change(&doc, "let x = 2").await.unwrap();

        launcher.server(0).crash();
        settle(&mut manager, |m| {
            launcher.launches() == 2 && state(m, &ClientKey::Shared) == Some(ClientState::Running)
        })
        .await;

        eventually(|| !launcher.server(1).frames("textDocument/didOpen").is_empty()).await;
        let replayed = &launcher.server(1).frames("textDocument/didOpen")[0];
        assert_eq!(replayed["params"]["textDocument"]["text"], "let x = 2");
        assert_eq!(replayed["params"]["textDocument"]["version"], 2);
    }

    #[tokio::test]
    async fn shared_scope_announces_folder_changes() {
        let config = config();
        let mut ws = workspace(&["/work/app"], &config).await;
        let launcher = FakeLauncher::new();
        let mut manager =
            LanguageClientManager::start(config, toolchain(), ws.folders(), launcher.clone()).await;

        let lib = ws.add_folder(url("/work/lib"), None).await.unwrap();
        manager.folder_added(&lib).await;
        manager.folder_removed(&url("/work/app")).await;
        manager.folder_removed(&url("/work/lib")).await;

        let server = launcher.server(0);
        eventually(|| server.frames("workspace/didChangeWorkspaceFolders").len() == 3).await;
        let changes = server.frames("workspace/didChangeWorkspaceFolders");
        assert_eq!(changes[0]["params"]["event"]["added"][0]["uri"], "file:///work/lib");
        assert_eq!(changes[1]["params"]["event"]["removed"][0]["uri"], "file:///work/app");

        // Single-file mode: the shared server survives its last folder.
        assert_eq!(launcher.launches(), 1);
        assert_eq!(state(&manager, &ClientKey::Shared), Some(ClientState::Running));
        assert!(manager.client(&ClientKey::Shared).unwrap().folders().await.is_empty());
    }

    #[tokio::test]
    async fn folder_scope_runs_one_server_per_folder() {
        let config = config().with_scope(ServerScope::Folder);
        let mut ws = workspace(&["/work/app"], &config).await;
        let launcher = FakeLauncher::new();
        let mut manager =
            LanguageClientManager::start(config, toolchain(), ws.folders(), launcher.clone()).await;

        let lib = ws.add_folder(url("/work/lib"), None).await.unwrap();
        manager.folder_added(&lib).await;
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.commands()[1].cwd, Some(PathBuf::from("/work/lib")));

        launcher.server(1).push(publish("/work/lib/Sources/Lib.swift", 1));
        settle(&mut manager, |m| m.snapshot().error_count() == 1).await;

        manager.folder_removed(&url("/work/lib")).await;
        assert!(manager.snapshot().is_empty());
        assert!(manager.client(&ClientKey::Folder(url("/work/lib"))).is_none());
        assert!(launcher.server(1).methods().contains(&"shutdown".to_string()));
        assert_eq!(
            manager.client_states(),
            vec![(ClientKey::Folder(url("/work/app")), ClientState::Running)]
        );
    }

    #[tokio::test]
    async fn re_added_folder_keeps_its_restart() {
        let config = config().with_scope(ServerScope::Folder);
        let ws = workspace(&["/work/lib"], &config).await;
        let launcher = FakeLauncher::new();
        let mut manager =
            LanguageClientManager::start(config, toolchain(), ws.folders(), launcher.clone()).await;
        let lib = Arc::clone(&ws.folders()[0]);
        let key = ClientKey::Folder(url("/work/lib"));

        manager.folder_removed(&url("/work/lib")).await;
        manager.folder_added(&lib).await;
        assert_eq!(launcher.launches(), 2);

        let retired = launcher.server(0);
        eventually(|| retired.methods().contains(&"exit".to_string())).await;
        for _ in 0..40 {
            manager.poll_events(64).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(launcher.launches(), 2);
        assert_eq!(state(&manager, &key), Some(ClientState::Running));
        assert!(manager.take_notices().is_empty());

        // The new server still has its restart.
        launcher.server(1).crash();
        settle(&mut manager, |m| {
            launcher.launches() == 3 && state(m, &key) == Some(ClientState::Running)
        })
        .await;
        assert!(manager.take_notices().is_empty());
    }

    #[tokio::test]
    async fn shared_scope_drops_diagnostics_of_removed_folder() {
        let config = config();
        let mut ws = workspace(&["/work/app"], &config).await;
        let launcher = FakeLauncher::new();
        let mut manager =
            LanguageClientManager::start(config, toolchain(), ws.folders(), launcher.clone()).await;
        let lib = ws.add_folder(url("/work/lib"), None).await.unwrap();
        manager.folder_added(&lib).await;

        let server = launcher.server(0);
        server.push(publish("/work/app/main.swift", 1));
        server.push(publish("/work/lib/Sources/Lib.swift", 1));
        settle(&mut manager, |m| m.snapshot().files().len() == 2).await;

        manager.folder_removed(&url("/work/lib")).await;
        let snap = manager.snapshot();
        assert_eq!(snap.files().len(), 1);
        assert_eq!(snap.files()[0].path, PathBuf::from("/work/app/main.swift"));
        assert_eq!(state(&manager, &ClientKey::Shared), Some(ClientState::Running));
    }

    #[tokio::test]
    async fn folder_scope_routes_loose_documents_to_focus() {
        let config = config().with_scope(ServerScope::Folder);
        let (mut manager, launcher) = manager_with(&["/work/app", "/work/lib"], config).await;
        let loose = url("/tmp/scratch.swift");

        assert!(matches!(
            manager.client_for(&loose),
            Err(ClientError::NoServer { .. })
        ));

        manager.folder_focused(Some(&url("/work/lib")));
        manager.completion(&loose, 0, 0).await.unwrap();
        assert_eq!(launcher.server(1).frames("textDocument/completion").len(), 1);
        assert!(launcher.server(0).frames("textDocument/completion").is_empty());

        let owned = manager.client_for(&url("/work/app/main.swift")).unwrap();
        assert_eq!(owned.key(), &ClientKey::Folder(url("/work/app")));
    }

    #[tokio::test]
    async fn diagnostics_outside_folders_are_rejected() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        let server = launcher.server(0);

        server.push(publish("/elsewhere/main.swift", 1));
        server.push(publish("/work/app/main.swift", 2));
        settle(&mut manager, |m| !m.snapshot().is_empty()).await;

        let snap = manager.snapshot();
        assert_eq!(snap.files().len(), 1);
        assert_eq!(snap.files()[0].path, PathBuf::from("/work/app/main.swift"));
        assert_eq!(snap.files()[0].items[0].severity(), DiagnosticSeverity::Warning);
    }

    #[tokio::test]
    async fn server_messages_become_notices() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        launcher.server(0).push(json!({
            "jsonrpc": "2.0",
            "method": "window/showMessage",
            "params": { "type": 1, "message": "sourcekitd crashed" }
        }));
        settle(&mut manager, |m| !m.notices.is_empty()).await;

        let notices = manager.take_notices();
        assert!(matches!(
            notices.as_slice(),
            [ClientNotice::ServerMessage { show: true, message, .. }] if message == "sourcekitd crashed"
        ));
    }

    #[tokio::test]
    async fn configuration_change_requires_reload() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;

        assert!(!manager.on_configuration_changed(&config()));
        assert!(manager.on_configuration_changed(&config().with_server_arguments(["-Xswiftc", "-g"])));

        assert_eq!(
            manager.take_notices(),
            vec![ClientNotice::ReloadRequired {
                settings: vec!["language_server.server_arguments".into()]
            }]
        );
        assert_eq!(launcher.launches(), 1);
        assert!(manager.config().server_arguments().is_empty());
    }

    #[tokio::test]
    async fn shutdown_sends_shutdown_and_exit() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        manager.shutdown().await;

        let server = launcher.server(0);
        eventually(|| server.methods().contains(&"exit".to_string())).await;
        let methods = server.methods();
        let shutdown = methods.iter().position(|m| m == "shutdown").unwrap();
        let exit = methods.iter().position(|m| m == "exit").unwrap();
        assert!(shutdown < exit);
        assert!(manager.client_states().is_empty());

        // A requested shutdown is not reported as a crash.
        manager.poll_events(16).await;
        assert!(manager.take_notices().is_empty());
    }

    #[tokio::test]
    async fn poll_events_respects_budget() {
        let (mut manager, launcher) = manager_with(&["/work/app"], config()).await;
        let server = launcher.server(0);
        for i in 0..5 {
            server.push(publish(&format!("/work/app/file{i}.swift"), 1));
        }

        let mut drained = 0;
        for _ in 0..400 {
            drained += manager.poll_events(2).await;
            if drained >= 5 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(drained, 5);
        assert_eq!(manager.snapshot().error_count(), 5);
        assert_eq!(manager.poll_events(10).await, 0);
    }
}

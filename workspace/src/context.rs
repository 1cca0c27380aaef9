//! `WorkspaceContext`: the ordered set of open folders and which one has focus.
//!
//! Every add, remove and focus change is announced to registered observers as
//! a [`FolderEvent`], in registration order or in reverse for teardown events.

use std::path::Path;
use std::sync::Arc;

use kestrel_config::ConfigSnapshot;
use kestrel_toolchain::ToolchainInfo;
use kestrel_types::FolderEvent;
use url::Url;

use crate::error::WorkspaceError;
use crate::folder::{FolderContext, WorkspaceShared};
use crate::observer::{FolderObserver, ObserverRegistration, ObserverRegistry};

/// Which folder, if any, holds focus.
///
/// `Uninitialized` and `Cleared` differ: nothing is unfocused on the first
/// focus change, while a cleared focus still fires `Unfocus(None)`.
#[derive(Debug, Clone, Default)]
pub enum FocusState {
    #[default]
    Uninitialized,
    Cleared,
    Folder(Arc<FolderContext>),
}

impl FocusState {
    fn same_as(&self, folder: Option<&Arc<FolderContext>>) -> bool {
        match (self, folder) {
            (Self::Cleared, None) => true,
            (Self::Folder(current), Some(next)) => Arc::ptr_eq(current, next),
            _ => false,
        }
    }

    #[must_use]
    pub fn folder(&self) -> Option<&Arc<FolderContext>> {
        match self {
            Self::Folder(folder) => Some(folder),
            Self::Uninitialized | Self::Cleared => None,
        }
    }
}

/// Ordered set of workspace folders plus the observers that follow them.
pub struct WorkspaceContext {
    shared: Arc<WorkspaceShared>,
    folders: Vec<Arc<FolderContext>>,
    focus: FocusState,
    observers: ObserverRegistry,
}

impl WorkspaceContext {
    #[must_use]
    pub fn new(toolchain: ToolchainInfo, config: ConfigSnapshot) -> Self {
        Self {
            shared: Arc::new(WorkspaceShared::new(toolchain, config)),
            folders: Vec::new(),
            focus: FocusState::Uninitialized,
            observers: ObserverRegistry::default(),
        }
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<WorkspaceShared> {
        &self.shared
    }

    #[must_use]
    pub fn toolchain(&self) -> &ToolchainInfo {
        self.shared.toolchain()
    }

    #[must_use]
    pub fn config(&self) -> &ConfigSnapshot {
        self.shared.config()
    }

    #[must_use]
    pub fn folders(&self) -> &[Arc<FolderContext>] {
        &self.folders
    }

    #[must_use]
    pub fn folder(&self, uri: &Url) -> Option<&Arc<FolderContext>> {
        self.folders.iter().find(|f| f.uri() == uri)
    }

    #[must_use]
    pub fn focus(&self) -> &FocusState {
        &self.focus
    }

    #[must_use]
    pub fn focused_folder(&self) -> Option<&Arc<FolderContext>> {
        self.focus.folder()
    }

    pub fn observe(&self, observer: Arc<dyn FolderObserver>) -> ObserverRegistration {
        self.observers.register(observer)
    }

    /// Add a folder and notify observers in registration order.
    ///
    /// A URI that is already present is returned as-is without events.
    pub async fn add_folder(
        &mut self,
        uri: Url,
        name: Option<String>,
    ) -> Result<Arc<FolderContext>, WorkspaceError> {
        if let Some(existing) = self.folder(&uri) {
            tracing::warn!(folder = %uri, "Folder added twice; keeping existing context");
            return Ok(Arc::clone(existing));
        }

        let folder = Arc::new(FolderContext::new(
            uri,
            name,
            Arc::downgrade(&self.shared),
        )?);
        self.folders.push(Arc::clone(&folder));
        tracing::info!(folder = %folder.uri(), name = folder.name(), "Workspace folder added");

        self.fire(Some(&folder), FolderEvent::Add).await;
        Ok(folder)
    }

    /// Remove a folder, unfocusing it first when it holds focus.
    ///
    /// `Remove` observers run in reverse registration order; the context is
    /// disposed only after all of them have returned.
    pub async fn remove_folder(&mut self, uri: &Url) -> Result<(), WorkspaceError> {
        let Some(folder) = self.folder(uri).cloned() else {
            tracing::error!(folder = %uri, "Removal of a folder the workspace does not know");
            return Err(WorkspaceError::UnknownFolder { uri: uri.clone() });
        };

        if self.focus.same_as(Some(&folder)) {
            self.focus_folder(None).await;
        }

        self.fire(Some(&folder), FolderEvent::Remove).await;

        folder.dispose();
        self.folders.retain(|f| !Arc::ptr_eq(f, &folder));
        tracing::info!(folder = %uri, "Workspace folder removed");
        Ok(())
    }

    /// Move focus to `folder` (`None` clears it). Re-focusing the current
    /// folder is a no-op.
    pub async fn focus_folder(&mut self, folder: Option<Arc<FolderContext>>) {
        if self.focus.same_as(folder.as_ref()) {
            return;
        }

        let previous = std::mem::replace(
            &mut self.focus,
            match &folder {
                Some(f) => FocusState::Folder(Arc::clone(f)),
                None => FocusState::Cleared,
            },
        );
        if !matches!(previous, FocusState::Uninitialized) {
            self.fire(previous.folder(), FolderEvent::Unfocus).await;
        }
        self.fire(folder.as_ref(), FolderEvent::Focus).await;
    }

    /// Folder whose path is the longest prefix of `path`.
    #[must_use]
    pub fn folder_for_path(&self, path: &Path) -> Option<&Arc<FolderContext>> {
        self.folders
            .iter()
            .filter(|f| f.contains(path))
            .max_by_key(|f| f.path().components().count())
    }

    /// Focus the folder that contains the active document, or clear focus
    /// when no folder does.
    pub async fn focus_document(&mut self, path: Option<&Path>) {
        let folder = path.and_then(|p| self.folder_for_path(p)).cloned();
        self.focus_folder(folder).await;
    }

    /// Tear down: remove every folder (most recently added first) through the
    /// normal removal path, then drop all observers.
    pub async fn dispose(mut self) {
        while let Some(folder) = self.folders.last().cloned() {
            if let Err(e) = self.remove_folder(folder.uri()).await {
                tracing::error!("Dispose could not remove folder: {e}");
                self.folders.pop();
            }
        }
        self.observers.clear();
    }

    async fn fire(&self, folder: Option<&Arc<FolderContext>>, event: FolderEvent) {
        self.observers
            .dispatch(folder, event, event.dispatch_order())
            .await;
    }
}

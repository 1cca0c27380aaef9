use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use kestrel_config::ConfigSnapshot;
use kestrel_toolchain::ToolchainInfo;
use url::Url;

use crate::error::WorkspaceError;

/// State every folder of a workspace shares: the discovered toolchain and the
/// configuration that was in effect when the workspace was activated.
#[derive(Debug)]
pub struct WorkspaceShared {
    toolchain: ToolchainInfo,
    config: ConfigSnapshot,
}

impl WorkspaceShared {
    #[must_use]
    pub fn new(toolchain: ToolchainInfo, config: ConfigSnapshot) -> Self {
        Self { toolchain, config }
    }

    #[must_use]
    pub fn toolchain(&self) -> &ToolchainInfo {
        &self.toolchain
    }

    #[must_use]
    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }
}

/// One workspace root reported by the host.
///
/// Holds identity and path bookkeeping only. Language server connections are
/// owned elsewhere and keyed by [`FolderContext::uri`].
#[derive(Debug)]
pub struct FolderContext {
    uri: Url,
    name: String,
    path: PathBuf,
    workspace: Weak<WorkspaceShared>,
    disposed: AtomicBool,
}

impl FolderContext {
    pub(crate) fn new(
        uri: Url,
        name: Option<String>,
        workspace: Weak<WorkspaceShared>,
    ) -> Result<Self, WorkspaceError> {
        let path = uri
            .to_file_path()
            .map_err(|()| WorkspaceError::NotAFileUri { uri: uri.clone() })?;
        let name = name.filter(|n| !n.is_empty()).unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        });
        Ok(Self {
            uri,
            name,
            path,
            workspace,
            disposed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute filesystem path. Tasks run with this as working directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owning workspace, unless it has already been torn down.
    #[must_use]
    pub fn workspace(&self) -> Option<Arc<WorkspaceShared>> {
        self.workspace.upgrade()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Whether `path` lies inside this folder.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            tracing::debug!(folder = %self.uri, "Folder already disposed");
        }
    }
}

//! Public types shared between the language client and the extension layer.

use std::fmt;
use std::path::{Path, PathBuf};

use kestrel_types::DiagnosticSeverity;
use serde::Serialize;
use url::Url;

/// Identity of a language client handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    /// The single server shared by every folder.
    Shared,
    /// A server dedicated to one workspace folder.
    Folder(Url),
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Folder(uri) => write!(f, "{uri}"),
        }
    }
}

/// Lifecycle state of one language client handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    Stopped,
    Starting,
    Running,
    Restarting,
}

impl ClientState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A folder as announced to the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceFolder {
    pub uri: Url,
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
}

impl WorkspaceFolder {
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// Severity of `window/logMessage` and `window/showMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
    Log,
}

impl MessageLevel {
    #[must_use]
    pub fn from_lsp(value: u64) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Warning,
            3 => Self::Info,
            _ => Self::Log,
        }
    }
}

/// Something the presentation layer should show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientNotice {
    /// Log or show message forwarded from a server.
    ServerMessage {
        client: String,
        level: MessageLevel,
        message: String,
        /// `true` for `window/showMessage`.
        show: bool,
    },
    StartFailed {
        client: String,
        error: String,
    },
    /// The server crashed again after its one restart.
    ServerCrashed {
        client: String,
    },
    /// Settings changed that only take effect after reloading.
    ReloadRequired {
        settings: Vec<String>,
    },
}

/// A single diagnostic pushed by a language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDiagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed.
    line: u32,
    /// 0-indexed.
    character: u32,
    source: String,
}

impl ServerDiagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        character: u32,
        source: String,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            character,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn character(&self) -> u32 {
        self.character
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Point-in-time copy of every diagnostic the servers have published.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Sorted with error-containing files first, then by path.
    files: Vec<FileDiagnostics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDiagnostics {
    pub path: PathBuf,
    pub items: Vec<ServerDiagnostic>,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(files: Vec<FileDiagnostics>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[FileDiagnostics] {
        &self.files
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn count(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|f| &f.items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count(DiagnosticSeverity::Warning)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|f| f.items.len()).sum()
    }
}

/// Failure of a single request routed through the manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("language client `{client}` is {state}")]
    NotRunning { client: String, state: ClientState },
    #[error("no language server handles {uri}")]
    NoServer { uri: Url },
    #[error("language server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("request `{method}` timed out")]
    Timeout { method: String },
    #[error("connection to the language server closed")]
    ChannelClosed,
}

impl ClientError {
    /// JSON-RPC error code reported to the host.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::NotRunning { .. } | Self::NoServer { .. } => crate::protocol::SERVER_NOT_INITIALIZED,
            Self::Timeout { .. } => crate::protocol::REQUEST_FAILED,
            Self::ChannelClosed => crate::protocol::INTERNAL_ERROR,
        }
    }
}

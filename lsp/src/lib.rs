//! Language client for Kestrel.
//!
//! [`LanguageClientManager`] owns the `sourcekit-lsp` processes, one shared
//! server or one per workspace folder, and keeps them alive across folder
//! changes and a single crash. [`ManagerObserver`] plugs it into a
//! `WorkspaceContext`.

pub mod codec;
pub mod types;

pub(crate) mod diagnostics;
pub(crate) mod protocol;
pub(crate) mod server;

mod handle;
mod manager;
mod observer;

#[cfg(test)]
mod testing;

pub use handle::LanguageClientHandle;
pub use manager::{LanguageClientManager, SERVER_EXECUTABLE, resolve_server_command};
pub use observer::ManagerObserver;
pub use server::{LaunchFut, ProcessLauncher, ServerCommand, ServerLauncher, ServerProcess};
pub use types::{
    ClientError, ClientKey, ClientNotice, ClientState, DiagnosticsSnapshot, FileDiagnostics,
    MessageLevel, ServerDiagnostic, WorkspaceFolder,
};

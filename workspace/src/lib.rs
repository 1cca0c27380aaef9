//! Workspace folder model for Kestrel.
//!
//! A [`WorkspaceContext`] owns the folders the host has reported and tells
//! registered [`FolderObserver`]s about additions, removals and focus
//! changes. Dispatch is sequential: each observer finishes before the next
//! one runs.

mod context;
mod error;
mod folder;
mod observer;

pub use context::{FocusState, WorkspaceContext};
pub use error::WorkspaceError;
pub use folder::{FolderContext, WorkspaceShared};
pub use observer::{
    FolderObserver, ObserverFut, ObserverId, ObserverRegistration, ObserverRegistry,
};

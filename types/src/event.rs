//! Folder lifecycle events broadcast by the workspace.

use std::fmt;

/// Lifecycle event for a workspace folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderEvent {
    /// Folder was added to the workspace.
    Add,
    /// Folder is about to be removed from the workspace.
    Remove,
    /// Folder became the focused folder (or focus was cleared).
    Focus,
    /// Folder lost focus.
    Unfocus,
}

/// Traversal direction over the observer list for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOrder {
    /// First registered observer runs first.
    Registration,
    /// Last registered observer runs first.
    Reverse,
}

impl FolderEvent {
    /// Removal unwinds state built up on `Add`, so it runs observers in the
    /// opposite order they were registered.
    #[must_use]
    pub fn dispatch_order(self) -> DispatchOrder {
        match self {
            Self::Remove => DispatchOrder::Reverse,
            Self::Add | Self::Focus | Self::Unfocus => DispatchOrder::Registration,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Focus => "focus",
            Self::Unfocus => "unfocus",
        }
    }
}

impl fmt::Display for FolderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Core domain types for Kestrel.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the extension.

mod event;
mod severity;
mod version;

pub use event::{DispatchOrder, FolderEvent};
pub use severity::DiagnosticSeverity;
pub use version::{ParseVersionError, Version};

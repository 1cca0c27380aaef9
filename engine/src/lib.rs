//! Extension core for Kestrel: activation, host event handling and the
//! per-tick language client pump.
//!
//! This crate has no terminal or process-level concerns; the binary feeds it
//! host events and writes out the messages it produces.

mod extension;
mod lsp_integration;

pub mod host;
pub mod problem_matcher;

#[cfg(test)]
mod testing;

pub use extension::Extension;
pub use host::{HostEvent, HostMessage, ResponseError};
pub use problem_matcher::{CompilerDiagnostic, match_line, match_output};

pub use kestrel_config::{ConfigSnapshot, read_configuration, read_configuration_from};
pub use kestrel_lsp::{ClientNotice, ClientState, DiagnosticsSnapshot};
pub use kestrel_toolchain::{ToolchainError, ToolchainInfo, ToolchainLocator};

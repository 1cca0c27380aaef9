//! Toolchain discovery for Kestrel.
//!
//! [`ToolchainLocator::locate`] finds the compiler, walks up to the
//! toolchain root and asks the compiler about its target, runtime and SDK.
//! Every subprocess goes through a [`CommandRunner`].

mod darwin_target;
mod error;
mod locator;
mod platform;
mod runner;
mod target_info;

pub use darwin_target::{DarwinTarget, UnknownDarwinTarget};
pub use error::ToolchainError;
pub use locator::{ToolchainInfo, ToolchainLocator};
pub use platform::{Platform, PlatformStrategy};
pub use runner::{CommandFut, CommandOutput, CommandRunner, TokioCommandRunner};
pub use target_info::{TargetInfo, parse_compiler_version};

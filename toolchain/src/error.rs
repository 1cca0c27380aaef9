//! Discovery failures. Every variant is fatal to workspace activation.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("toolchain executable not found: {detail}")]
    ExecutableNotFound { detail: String },
    #[error("toolchain path not found: {detail}")]
    ToolchainPathNotFound { detail: String },
    #[error("target info unparseable: {detail}")]
    TargetInfoUnparseable { detail: String },
}

impl ToolchainError {
    pub(crate) fn executable_not_found(detail: impl Into<String>) -> Self {
        Self::ExecutableNotFound {
            detail: detail.into(),
        }
    }

    pub(crate) fn toolchain_path_not_found(path: &Path) -> Self {
        Self::ToolchainPathNotFound {
            detail: format!("no toolchain root above {}", path.display()),
        }
    }

    pub(crate) fn target_info(detail: impl Into<String>) -> Self {
        Self::TargetInfoUnparseable {
            detail: detail.into(),
        }
    }
}


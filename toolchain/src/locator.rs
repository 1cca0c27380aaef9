use std::path::{Path, PathBuf};
use std::sync::Arc;

use kestrel_config::ConfigSnapshot;
use kestrel_types::Version;
use serde::Serialize;

use crate::error::ToolchainError;
use crate::platform::{COMPILER, Platform};
use crate::runner::{CommandRunner, TokioCommandRunner};
use crate::target_info::{TargetInfo, parse_compiler_version};

/// Version-manager shims that must be asked for the real compiler.
/// Matched against the tail of the resolved compiler path.
const SHIMS: &[(&[&str], &str)] = &[
    (&[".swiftenv", "shims"], "swiftenv"),
    (&[".asdf", "shims"], "asdf"),
];

/// Everything discovered about the active toolchain. Immutable once built;
/// a reload replaces it wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainInfo {
    /// Folder containing the compiler executable.
    pub swift_folder_path: PathBuf,
    pub toolchain_path: PathBuf,
    pub compiler_version: String,
    pub version: Version,
    pub runtime_path: Option<PathBuf>,
    pub default_target: Option<String>,
    pub default_sdk: Option<PathBuf>,
    pub xctest_path: Option<PathBuf>,
    #[serde(skip)]
    pub platform: Platform,
}

impl ToolchainInfo {
    /// Path of a tool shipped in the toolchain's `usr/bin`.
    #[must_use]
    pub fn toolchain_executable(&self, name: &str) -> PathBuf {
        self.toolchain_path
            .join("usr")
            .join("bin")
            .join(self.platform.strategy().executable_name(name))
    }
}

pub struct ToolchainLocator {
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    override_folder: Option<PathBuf>,
}

impl ToolchainLocator {
    /// Locator for the current host, honoring the configured override folder.
    #[must_use]
    pub fn new(config: &ConfigSnapshot) -> Self {
        Self::with_runner(Arc::new(TokioCommandRunner), Platform::current())
            .with_override(config.toolchain_path().map(Path::to_path_buf))
    }

    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>, platform: Platform) -> Self {
        Self {
            runner,
            platform,
            override_folder: None,
        }
    }

    #[must_use]
    pub fn with_override(mut self, folder: Option<PathBuf>) -> Self {
        self.override_folder = folder;
        self
    }

    pub async fn locate(&self) -> Result<ToolchainInfo, ToolchainError> {
        let strategy = self.platform.strategy();
        let runner = self.runner.as_ref();

        let swift_folder_path = self.swift_folder().await?;
        let toolchain_path = strategy
            .toolchain_path(runner, &swift_folder_path, self.override_folder.as_deref())
            .await?;

        let swift = swift_folder_path.join(strategy.executable_name(COMPILER));
        let target_info = self.target_info(&swift).await?;
        let compiler_version = match &target_info.compiler_version {
            Some(v) => v.clone(),
            None => self.version_line(&swift).await,
        };
        let version = parse_compiler_version(&compiler_version);

        let runtime_path = strategy.runtime_path(runner, &target_info).await;
        let default_sdk = match runner.env_var("SDKROOT") {
            Some(sdk) => Some(PathBuf::from(sdk)),
            None => strategy.default_sdk(runner).await,
        };
        let xctest_path = strategy
            .test_framework_path(runner, default_sdk.as_deref())
            .await;

        let info = ToolchainInfo {
            swift_folder_path,
            toolchain_path,
            compiler_version,
            version,
            runtime_path,
            default_target: target_info.triple().map(str::to_string),
            default_sdk,
            xctest_path,
            platform: self.platform,
        };
        tracing::info!(
            toolchain = %info.toolchain_path.display(),
            version = %info.version,
            target = info.default_target.as_deref().unwrap_or("unknown"),
            "Located toolchain"
        );
        Ok(info)
    }

    async fn swift_folder(&self) -> Result<PathBuf, ToolchainError> {
        if let Some(folder) = &self.override_folder {
            return Ok(folder.clone());
        }
        let runner = self.runner.as_ref();
        let found = self.platform.strategy().find_compiler(runner).await?;
        let mut compiler = runner.resolve_symlinks(&found);

        if let Some(manager) = shim_manager(&compiler) {
            compiler = self.ask_shim(manager).await?;
        }
        tracing::debug!(compiler = %compiler.display(), "Resolved compiler");

        compiler
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ToolchainError::executable_not_found(format!(
                    "{} has no parent folder",
                    compiler.display()
                ))
            })
    }

    async fn ask_shim(&self, manager: &str) -> Result<PathBuf, ToolchainError> {
        let output = self
            .runner
            .run(Path::new(manager), &["which", COMPILER])
            .await
            .map_err(|e| ToolchainError::executable_not_found(format!("{manager}: {e}")))?;
        match output.first_line() {
            Some(line) if output.success => Ok(PathBuf::from(line)),
            _ => Err(ToolchainError::executable_not_found(format!(
                "`{manager} which {COMPILER}` failed: {}",
                output.stderr.trim()
            ))),
        }
    }

    async fn target_info(&self, swift: &Path) -> Result<TargetInfo, ToolchainError> {
        let output = self
            .runner
            .run(swift, &["-print-target-info"])
            .await
            .map_err(|e| {
                ToolchainError::target_info(format!("failed to run {}: {e}", swift.display()))
            })?;
        if !output.success {
            return Err(ToolchainError::target_info(format!(
                "{} -print-target-info failed: {}",
                swift.display(),
                output.stderr.trim()
            )));
        }
        TargetInfo::parse(&output.stdout)
    }

    /// First line of `swift --version`, or empty when it cannot be run.
    async fn version_line(&self, swift: &Path) -> String {
        match self.runner.run(swift, &["--version"]).await {
            Ok(out) if out.success => out.first_line().unwrap_or_default().to_string(),
            Ok(out) => {
                tracing::warn!(stderr = out.stderr.trim(), "`swift --version` failed");
                String::new()
            }
            Err(e) => {
                tracing::warn!("Could not run `swift --version`: {e}");
                String::new()
            }
        }
    }
}

fn shim_manager(compiler: &Path) -> Option<&'static str> {
    let folder = compiler.parent()?;
    SHIMS.iter().find_map(|(tail, manager)| {
        let mut components = folder.components().rev();
        let matches = tail
            .iter()
            .rev()
            .all(|expected| components.next().is_some_and(|c| c.as_os_str() == *expected));
        matches.then_some(*manager)
    })
}

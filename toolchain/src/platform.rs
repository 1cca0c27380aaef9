//! Platform-specific discovery strategies.
//!
//! [`Platform::current`] is evaluated once per locator; every platform quirk
//! lives behind [`PlatformStrategy`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::ToolchainError;
use crate::runner::CommandRunner;
use crate::target_info::TargetInfo;

pub type DiscoveryFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, ToolchainError>> + Send + 'a>>;

/// Future for lookups whose failure only degrades the result.
pub type OptionalFut<'a> = Pin<Box<dyn Future<Output = Option<PathBuf>> + Send + 'a>>;

pub const COMPILER: &str = "swift";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Darwin,
    Windows,
    /// Linux and every other Unix-like system.
    Unix,
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    #[must_use]
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" => Self::Darwin,
            "windows" => Self::Windows,
            _ => Self::Unix,
        }
    }

    #[must_use]
    pub fn strategy(self) -> &'static dyn PlatformStrategy {
        match self {
            Self::Darwin => &DarwinStrategy,
            Self::Windows => &WindowsStrategy,
            Self::Unix => &UnixStrategy,
        }
    }
}

pub trait PlatformStrategy: Send + Sync {
    /// File name of an executable called `base` on this platform.
    fn executable_name(&self, base: &str) -> String {
        base.to_string()
    }

    fn path_separator(&self) -> &'static str {
        ":"
    }

    /// Locate the compiler when no override folder is configured.
    fn find_compiler<'a>(&'a self, runner: &'a dyn CommandRunner) -> DiscoveryFut<'a, PathBuf>;

    /// Toolchain root for the folder that contains the compiler.
    fn toolchain_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        swift_folder: &'a Path,
        override_path: Option<&'a Path>,
    ) -> DiscoveryFut<'a, PathBuf> {
        let _ = (runner, override_path);
        Box::pin(async move {
            ancestor(swift_folder, 2)
                .ok_or_else(|| ToolchainError::toolchain_path_not_found(swift_folder))
        })
    }

    fn runtime_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        target_info: &'a TargetInfo,
    ) -> OptionalFut<'a> {
        let _ = runner;
        let separator = self.path_separator();
        Box::pin(async move {
            let paths = &target_info.paths.runtime_library_paths;
            if paths.is_empty() {
                None
            } else {
                Some(PathBuf::from(paths.join(separator)))
            }
        })
    }

    /// Platform default SDK. `SDKROOT` is honored by the caller first.
    fn default_sdk<'a>(&'a self, runner: &'a dyn CommandRunner) -> OptionalFut<'a> {
        let _ = runner;
        Box::pin(async { None })
    }

    fn test_framework_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        sdk: Option<&'a Path>,
    ) -> OptionalFut<'a> {
        let _ = (runner, sdk);
        Box::pin(async { None })
    }
}

/// Parent `levels` steps above `path`, if the path is that deep.
pub(crate) fn ancestor(path: &Path, levels: usize) -> Option<PathBuf> {
    path.ancestors()
        .nth(levels)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Run `program args` and return the first stdout line of a successful run.
async fn first_line_of(
    runner: &dyn CommandRunner,
    program: &Path,
    args: &[&str],
) -> Result<String, String> {
    match runner.run(program, args).await {
        Ok(out) if out.success => out
            .first_line()
            .map(str::to_string)
            .ok_or_else(|| format!("`{}` printed nothing", program.display())),
        Ok(out) => Err(format!(
            "`{}` failed: {}",
            program.display(),
            out.stderr.trim()
        )),
        Err(e) => Err(format!("failed to run `{}`: {e}", program.display())),
    }
}

fn find_compiler_in_path(
    strategy: &dyn PlatformStrategy,
    runner: &dyn CommandRunner,
) -> Result<PathBuf, ToolchainError> {
    let name = strategy.executable_name(COMPILER);
    runner
        .find_in_path(&name)
        .ok_or_else(|| ToolchainError::executable_not_found(format!("`{name}` is not on PATH")))
}

// ── macOS ──────────────────────────────────────────────────────────────

pub struct DarwinStrategy;

const XCRUN: &str = "/usr/bin/xcrun";

impl PlatformStrategy for DarwinStrategy {
    fn find_compiler<'a>(&'a self, runner: &'a dyn CommandRunner) -> DiscoveryFut<'a, PathBuf> {
        Box::pin(async move { find_compiler_in_path(self, runner) })
    }

    /// Xcode installs are asked for their canonical toolchain; an override
    /// folder is treated like any other `<root>/usr/bin`.
    fn toolchain_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        swift_folder: &'a Path,
        override_path: Option<&'a Path>,
    ) -> DiscoveryFut<'a, PathBuf> {
        Box::pin(async move {
            if let Some(folder) = override_path {
                return ancestor(folder, 2)
                    .ok_or_else(|| ToolchainError::toolchain_path_not_found(folder));
            }
            let found = first_line_of(runner, Path::new(XCRUN), &["--find", COMPILER])
                .await
                .map_err(|detail| ToolchainError::ToolchainPathNotFound { detail })?;
            let swift = PathBuf::from(found);
            ancestor(&swift, 3).ok_or_else(|| {
                tracing::debug!(folder = %swift_folder.display(), "xcrun result too shallow");
                ToolchainError::toolchain_path_not_found(&swift)
            })
        })
    }

    fn default_sdk<'a>(&'a self, runner: &'a dyn CommandRunner) -> OptionalFut<'a> {
        Box::pin(async move {
            match first_line_of(
                runner,
                Path::new(XCRUN),
                &["--sdk", "macosx", "--show-sdk-path"],
            )
            .await
            {
                Ok(path) => Some(PathBuf::from(path)),
                Err(e) => {
                    tracing::warn!("Could not determine default SDK: {e}");
                    None
                }
            }
        })
    }

    fn test_framework_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        _sdk: Option<&'a Path>,
    ) -> OptionalFut<'a> {
        Box::pin(async move {
            match first_line_of(
                runner,
                Path::new(XCRUN),
                &["--sdk", "macosx", "--show-sdk-platform-path"],
            )
            .await
            {
                Ok(platform) => Some(
                    PathBuf::from(platform)
                        .join("Developer")
                        .join("Library")
                        .join("Frameworks"),
                ),
                Err(e) => {
                    tracing::debug!("No XCTest location: {e}");
                    None
                }
            }
        })
    }
}

// ── Windows ────────────────────────────────────────────────────────────

pub struct WindowsStrategy;

const RUNTIME_LIBRARY: &str = "Foundation.dll";

impl PlatformStrategy for WindowsStrategy {
    fn executable_name(&self, base: &str) -> String {
        format!("{base}.exe")
    }

    fn path_separator(&self) -> &'static str {
        ";"
    }

    fn find_compiler<'a>(&'a self, runner: &'a dyn CommandRunner) -> DiscoveryFut<'a, PathBuf> {
        Box::pin(async move { find_compiler_in_path(self, runner) })
    }

    /// The runtime ships as DLLs on `PATH` rather than in the target info.
    fn runtime_path<'a>(
        &'a self,
        runner: &'a dyn CommandRunner,
        _target_info: &'a TargetInfo,
    ) -> OptionalFut<'a> {
        Box::pin(async move {
            let dll = runner.find_in_path(RUNTIME_LIBRARY)?;
            dll.parent().map(Path::to_path_buf)
        })
    }

    fn test_framework_path<'a>(
        &'a self,
        _runner: &'a dyn CommandRunner,
        sdk: Option<&'a Path>,
    ) -> OptionalFut<'a> {
        Box::pin(async move {
            let platform = ancestor(sdk?, 2)?;
            Some(
                platform
                    .join("Library")
                    .join("XCTest-development")
                    .join("usr")
                    .join("bin"),
            )
        })
    }
}

// ── Linux and other Unix ───────────────────────────────────────────────

pub struct UnixStrategy;

const SHELL: &str = "/bin/sh";

/// Parse the output of the shell builtin `type swift`.
///
/// Accepts both `swift is /usr/bin/swift` and bash's
/// `swift is hashed (/usr/bin/swift)`.
pub(crate) fn parse_type_output(stdout: &str) -> Option<PathBuf> {
    let prefix = format!("{COMPILER} is ");
    let line = stdout.lines().find_map(|l| l.trim().strip_prefix(&prefix))?;
    let path = line
        .strip_prefix("hashed (")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(line)
        .trim();
    if path.starts_with('/') {
        Some(PathBuf::from(path))
    } else {
        None
    }
}

impl PlatformStrategy for UnixStrategy {
    fn find_compiler<'a>(&'a self, runner: &'a dyn CommandRunner) -> DiscoveryFut<'a, PathBuf> {
        Box::pin(async move {
            let script = format!("LC_MESSAGES=C type {COMPILER}");
            let output = runner
                .run(Path::new(SHELL), &["-c", &script])
                .await
                .map_err(|e| ToolchainError::executable_not_found(format!("{SHELL}: {e}")))?;
            if !output.success {
                return Err(ToolchainError::executable_not_found(format!(
                    "`type {COMPILER}` failed: {}",
                    output.stderr.trim()
                )));
            }
            parse_type_output(&output.stdout).ok_or_else(|| {
                ToolchainError::executable_not_found(format!(
                    "unexpected `type {COMPILER}` output: {}",
                    output.stdout.trim()
                ))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use crate::runner::fake::FakeRunner;

    #[test]
    fn platform_from_os() {
        assert_eq!(Platform::from_os("macos"), Platform::Darwin);
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Unix);
        assert_eq!(Platform::from_os("freebsd"), Platform::Unix);
    }

    #[test]
    fn parse_type_output_variants() {
        assert_eq!(
            parse_type_output("swift is /usr/bin/swift\n"),
            Some(PathBuf::from("/usr/bin/swift"))
        );
        assert_eq!(
            parse_type_output("swift is hashed (/opt/swift/usr/bin/swift)"),
            Some(PathBuf::from("/opt/swift/usr/bin/swift"))
        );
        assert_eq!(parse_type_output("sh: type: swift: not found"), None);
        assert_eq!(parse_type_output("swift is a shell function"), None);
    }

    #[test]
    fn ancestor_steps_up() {
        assert_eq!(
            ancestor(Path::new("/usr/bin"), 2),
            Some(PathBuf::from("/"))
        );
        assert_eq!(ancestor(Path::new("/usr/bin"), 3), None);
        assert_eq!(ancestor(Path::new("bin"), 1), None);
    }

    #[tokio::test]
    async fn unix_toolchain_path_is_two_levels_up() {
        let runner = FakeRunner::default();
        let root = UnixStrategy
            .toolchain_path(&runner, Path::new("/opt/swift/usr/bin"), None)
            .await
            .unwrap();
        assert_eq!(root, PathBuf::from("/opt/swift"));
    }

    #[tokio::test]
    async fn darwin_toolchain_path_asks_xcrun() {
        let runner = FakeRunner::default().command(
            "/usr/bin/xcrun --find swift",
            CommandOutput::ok(
                "/Applications/Xcode.app/Contents/Developer/Toolchains/XcodeDefault.xctoolchain/usr/bin/swift\n",
            ),
        );
        let root = DarwinStrategy
            .toolchain_path(&runner, Path::new("/usr/bin"), None)
            .await
            .unwrap();
        assert_eq!(
            root,
            PathBuf::from(
                "/Applications/Xcode.app/Contents/Developer/Toolchains/XcodeDefault.xctoolchain"
            )
        );
    }

    #[tokio::test]
    async fn darwin_override_skips_xcrun() {
        let runner = FakeRunner::default();
        let root = DarwinStrategy
            .toolchain_path(
                &runner,
                Path::new("/Library/Developer/Toolchains/swift-6.0.xctoolchain/usr/bin"),
                Some(Path::new(
                    "/Library/Developer/Toolchains/swift-6.0.xctoolchain/usr/bin",
                )),
            )
            .await
            .unwrap();
        assert_eq!(
            root,
            PathBuf::from("/Library/Developer/Toolchains/swift-6.0.xctoolchain")
        );
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn darwin_xcrun_failure_is_path_not_found() {
        let runner = FakeRunner::default().command(
            "/usr/bin/xcrun --find swift",
            CommandOutput::failed("xcrun: error: unable to find utility \"swift\""),
        );
        let err = DarwinStrategy
            .toolchain_path(&runner, Path::new("/usr/bin"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::ToolchainPathNotFound { .. }));
    }

    #[tokio::test]
    async fn runtime_path_joins_with_platform_separator() {
        let info = TargetInfo::parse(
            r#"{"paths": {"runtimeLibraryPaths": ["/usr/lib/swift/linux", "/opt/lib"]}}"#,
        )
        .unwrap();
        let runner = FakeRunner::default();
        assert_eq!(
            UnixStrategy.runtime_path(&runner, &info).await,
            Some(PathBuf::from("/usr/lib/swift/linux:/opt/lib"))
        );

        let empty = TargetInfo::default();
        assert_eq!(UnixStrategy.runtime_path(&runner, &empty).await, None);
    }

    #[tokio::test]
    async fn windows_runtime_path_is_foundation_folder() {
        let runner = FakeRunner::default().in_path(
            "Foundation.dll",
            "C:/Library/Swift/Runtimes/5.9.2/usr/bin/Foundation.dll",
        );
        let info = TargetInfo::default();
        assert_eq!(
            WindowsStrategy.runtime_path(&runner, &info).await,
            Some(PathBuf::from("C:/Library/Swift/Runtimes/5.9.2/usr/bin"))
        );
    }

    #[tokio::test]
    async fn windows_test_framework_derives_from_sdk() {
        let runner = FakeRunner::default();
        let sdk = Path::new("C:/Library/Developer/Platforms/Windows.platform/Developer/SDKs/Windows.sdk");
        assert_eq!(
            WindowsStrategy
                .test_framework_path(&runner, Some(sdk))
                .await,
            Some(PathBuf::from(
                "C:/Library/Developer/Platforms/Windows.platform/Developer/Library/XCTest-development/usr/bin"
            ))
        );
        assert_eq!(WindowsStrategy.test_framework_path(&runner, None).await, None);
    }

    #[tokio::test]
    async fn unix_compiler_lookup_failure() {
        let runner = FakeRunner::default().command(
            "/bin/sh -c LC_MESSAGES=C type swift",
            CommandOutput::failed("sh: 1: type: swift: not found"),
        );
        let err = UnixStrategy.find_compiler(&runner).await.unwrap_err();
        assert!(matches!(err, ToolchainError::ExecutableNotFound { .. }));
    }
}

//! Configuration for Kestrel.
//!
//! The on-disk file lives at `~/.kestrel/config.toml`:
//!
//! ```toml
//! [toolchain]
//! path = "/opt/swift/usr/bin"
//!
//! [language_server]
//! disable = false
//! server_path = ""
//! server_arguments = ["--log-level", "debug"]
//! scope = "shared"
//! ```
//!
//! Nothing caches a parsed config. Decision points call [`read_configuration`]
//! and work from the returned [`ConfigSnapshot`].

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Raw file contents. Empty strings mean "not set".
#[derive(Debug, Default, Deserialize)]
pub struct KestrelConfig {
    pub toolchain: Option<ToolchainConfig>,
    pub language_server: Option<LanguageServerConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolchainConfig {
    /// Folder containing the `swift` executable. Overrides discovery.
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LanguageServerConfig {
    #[serde(default)]
    pub disable: bool,
    /// Explicit language server executable. Default: next to the toolchain.
    #[serde(default)]
    pub server_path: String,
    #[serde(default)]
    pub server_arguments: Vec<String>,
    #[serde(default)]
    pub scope: ServerScope,
}

/// How many language server processes serve the workspace.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerScope {
    /// One server for every folder in the workspace.
    #[default]
    Shared,
    /// One server per workspace folder.
    Folder,
}

impl ServerScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Folder => "folder",
        }
    }
}

/// Immutable view of the settings that drive toolchain discovery and the
/// language client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    toolchain_path: Option<PathBuf>,
    disable: bool,
    server_path: Option<PathBuf>,
    server_arguments: Vec<String>,
    scope: ServerScope,
}

fn non_empty_path(raw: &str) -> Option<PathBuf> {
    let expanded = expand_env_vars(raw.trim());
    if expanded.is_empty() {
        None
    } else {
        Some(PathBuf::from(expanded))
    }
}

impl ConfigSnapshot {
    #[must_use]
    pub fn from_config(config: &KestrelConfig) -> Self {
        let toolchain_path = config
            .toolchain
            .as_ref()
            .and_then(|t| non_empty_path(&t.path));
        let server = config.language_server.as_ref();
        Self {
            toolchain_path,
            disable: server.is_some_and(|s| s.disable),
            server_path: server.and_then(|s| non_empty_path(&s.server_path)),
            server_arguments: server
                .map(|s| s.server_arguments.clone())
                .unwrap_or_default(),
            scope: server.map(|s| s.scope).unwrap_or_default(),
        }
    }

    /// Parse a snapshot straight from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let config: KestrelConfig = toml::from_str(content)?;
        Ok(Self::from_config(&config))
    }

    /// Override folder for the `swift` executable, if configured.
    #[must_use]
    pub fn toolchain_path(&self) -> Option<&Path> {
        self.toolchain_path.as_deref()
    }

    #[must_use]
    pub fn disable(&self) -> bool {
        self.disable
    }

    #[must_use]
    pub fn server_path(&self) -> Option<&Path> {
        self.server_path.as_deref()
    }

    #[must_use]
    pub fn server_arguments(&self) -> &[String] {
        &self.server_arguments
    }

    #[must_use]
    pub fn scope(&self) -> ServerScope {
        self.scope
    }

    pub fn with_toolchain_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.toolchain_path = Some(path.into());
        self
    }

    pub fn with_disable(mut self, disable: bool) -> Self {
        self.disable = disable;
        self
    }

    pub fn with_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_path = Some(path.into());
        self
    }

    pub fn with_server_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope(mut self, scope: ServerScope) -> Self {
        self.scope = scope;
        self
    }

    /// Settings that differ between `self` and `next` and cannot be applied
    /// without reloading the extension host.
    #[must_use]
    pub fn reload_required(&self, next: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.toolchain_path != next.toolchain_path {
            changed.push("toolchain.path");
        }
        if self.disable != next.disable {
            changed.push("language_server.disable");
        }
        if self.server_path != next.server_path {
            changed.push("language_server.server_path");
        }
        if self.server_arguments != next.server_arguments {
            changed.push("language_server.server_arguments");
        }
        if self.scope != next.scope {
            changed.push("language_server.scope");
        }
        changed
    }
}

/// Replace `${VAR}` references with the environment value (empty if unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl KestrelConfig {
    /// Load the user config. `Ok(None)` when no config file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

/// Snapshot the current user configuration.
///
/// A missing, unreadable or invalid file yields the defaults; the failure is
/// logged by [`KestrelConfig::load_from`].
#[must_use]
pub fn read_configuration() -> ConfigSnapshot {
    snapshot_of(KestrelConfig::load())
}

#[must_use]
pub fn read_configuration_from(path: &Path) -> ConfigSnapshot {
    snapshot_of(KestrelConfig::load_from(path))
}

fn snapshot_of(loaded: Result<Option<KestrelConfig>, ConfigError>) -> ConfigSnapshot {
    match loaded {
        Ok(Some(config)) => ConfigSnapshot::from_config(&config),
        Ok(None) => ConfigSnapshot::default(),
        Err(e) => {
            tracing::debug!(path = %e.path().display(), "Using default configuration");
            ConfigSnapshot::default()
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kestrel").join("config.toml"))
}

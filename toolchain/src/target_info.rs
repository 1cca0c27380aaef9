//! Parsing of `swift -print-target-info` and `swift --version` output.

use std::sync::OnceLock;

use kestrel_types::Version;
use regex::Regex;
use serde::Deserialize;

use crate::error::ToolchainError;

/// Structured document printed by `swift -print-target-info`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Absent on older compilers; callers fall back to `--version`.
    pub compiler_version: Option<String>,
    pub target: Option<TargetSection>,
    #[serde(default)]
    pub paths: TargetPaths,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSection {
    pub triple: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPaths {
    #[serde(default)]
    pub runtime_library_paths: Vec<String>,
}

impl TargetInfo {
    /// Parse the JSON object embedded in `stdout`.
    ///
    /// Some toolchains print warnings around the document, so everything
    /// outside the outermost braces is ignored.
    pub fn parse(stdout: &str) -> Result<Self, ToolchainError> {
        let (Some(start), Some(end)) = (stdout.find('{'), stdout.rfind('}')) else {
            return Err(ToolchainError::target_info("no JSON object in output"));
        };
        if end < start {
            return Err(ToolchainError::target_info("no JSON object in output"));
        }
        serde_json::from_str(&stdout[start..=end])
            .map_err(|e| ToolchainError::target_info(e.to_string()))
    }

    #[must_use]
    pub fn triple(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.triple.as_str())
    }
}

fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"version\s+(\S+)").expect("version regex is valid"))
}

/// Extract the semantic version from a compiler version string.
///
/// Strings without a parseable `version <token>` resolve to `0.0.0`.
#[must_use]
pub fn parse_compiler_version(version_string: &str) -> Version {
    let parsed = version_regex()
        .captures(version_string)
        .and_then(|caps| caps.get(1))
        .and_then(|token| token.as_str().parse::<Version>().ok());

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            version = version_string,
            "Could not parse compiler version; assuming 0.0.0"
        );
        Version::ZERO
    })
}

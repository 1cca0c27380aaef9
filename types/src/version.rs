//! Semantic version reported by the toolchain compiler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A `major.minor.patch` version triple.
///
/// Ordering is lexicographic over the components, so `5.10.0 > 5.9.2`.
/// Serializes as the dotted string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version `{0}`")]
pub struct ParseVersionError(String);

impl Version {
    /// Fallback used when the compiler's version string cannot be parsed.
    pub const ZERO: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    #[must_use]
    pub const fn major(self) -> u32 {
        self.major
    }

    #[must_use]
    pub const fn minor(self) -> u32 {
        self.minor
    }

    #[must_use]
    pub const fn patch(self) -> u32 {
        self.patch
    }

    #[must_use]
    pub fn is_at_least(self, major: u32, minor: u32, patch: u32) -> bool {
        self >= Self::new(major, minor, patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Leading ASCII digits of `component`, parsed. `"2-dev"` → `2`.
fn leading_number(component: &str) -> Option<u32> {
    let end = component
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(component.len());
    component[..end].parse().ok()
}

impl FromStr for Version {
    type Err = ParseVersionError;

    /// Accepts `major.minor` or `major.minor.patch`; the last component may
    /// carry a pre-release suffix (`5.10-dev`), which is dropped.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVersionError(raw.to_string());
        let mut parts = raw.trim().splitn(3, '.');

        let major = parts.next().and_then(leading_number).ok_or_else(invalid)?;
        let minor = parts.next().and_then(leading_number).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => leading_number(p).ok_or_else(invalid)?,
            None => 0,
        };

        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for Version {
    type Error = ParseVersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

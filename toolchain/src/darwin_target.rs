//! Apple device platforms a build can be cross-compiled for.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DarwinTarget {
    Ios,
    Tvos,
    Watchos,
}

impl DarwinTarget {
    pub const ALL: [Self; 3] = [Self::Ios, Self::Tvos, Self::Watchos];

    /// Short SDK name as understood by `xcrun --sdk`.
    #[must_use]
    pub fn sdk_name(self) -> &'static str {
        match self {
            Self::Ios => "iphoneos",
            Self::Tvos => "appletvos",
            Self::Watchos => "watchos",
        }
    }

    #[must_use]
    pub fn default_triple(self) -> &'static str {
        match self {
            Self::Ios => "arm64-apple-ios",
            Self::Tvos => "arm64-apple-tvos",
            Self::Watchos => "armv7k-apple-watchos",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Tvos => "tvos",
            Self::Watchos => "watchos",
        }
    }
}

impl fmt::Display for DarwinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown darwin target `{0}`")]
pub struct UnknownDarwinTarget(String);

impl FromStr for DarwinTarget {
    type Err = UnknownDarwinTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "tvos" => Ok(Self::Tvos),
            "watchos" => Ok(Self::Watchos),
            _ => Err(UnknownDarwinTarget(s.to_string())),
        }
    }
}

//! Validated target triples.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

use crate::error::{Result, TargetError};

/// A target platform identified by its triple, e.g. `x86_64-unknown-linux-gnu`.
///
/// The triple text is kept verbatim so that it can be used as a stable key in
/// per-platform tables and serialized trees. Ordering is lexical on that text,
/// which keeps every platform-keyed map deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetPlatform(String);

impl TargetPlatform {
    /// Parse and validate a triple.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        trimmed
            .parse::<Triple>()
            .map_err(|e| TargetError::InvalidTriple {
                triple: trimmed.to_string(),
                detail: e.to_string(),
            })?;
        Ok(Self(trimmed.to_string()))
    }

    /// The triple text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into a `target_lexicon::Triple`.
    pub fn triple(&self) -> Result<Triple> {
        self.0.parse::<Triple>().map_err(|e| TargetError::InvalidTriple {
            triple: self.0.clone(),
            detail: e.to_string(),
        })
    }

    /// Architecture component (`x86_64`, `aarch64`, `armv7`, ...).
    pub fn arch(&self) -> String {
        self.triple()
            .map(|t| t.architecture.to_string())
            .unwrap_or_default()
    }

    /// Operating system component (`linux`, `windows`, `darwin`, ...).
    pub fn os(&self) -> String {
        self.triple()
            .map(|t| t.operating_system.to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TargetPlatform {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetPlatform {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TargetPlatform> for String {
    fn from(value: TargetPlatform) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_triples() {
        for s in [
            "x86_64-unknown-linux-gnu",
            "aarch64-apple-darwin",
            "x86_64-pc-windows-msvc",
            "armv7-unknown-linux-gnueabihf",
        ] {
            let p = TargetPlatform::parse(s).unwrap();
            assert_eq!(p.as_str(), s);
        }
    }

    #[test]
    fn rejects_garbage() {
        let err = TargetPlatform::parse("not-a-real-triple-at-all").unwrap_err();
        assert!(err.to_string().contains("not-a-real-triple-at-all"));
    }

    #[test]
    fn exposes_components() {
        let p = TargetPlatform::parse("aarch64-unknown-linux-gnu").unwrap();
        assert_eq!(p.arch(), "aarch64");
        assert_eq!(p.os(), "linux");
    }

    #[test]
    fn orders_lexically() {
        let a = TargetPlatform::parse("aarch64-apple-darwin").unwrap();
        let b = TargetPlatform::parse("x86_64-unknown-linux-gnu").unwrap();
        assert!(a < b);
    }
}

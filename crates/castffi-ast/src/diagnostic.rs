//! Diagnostics produced by the front end, the explorer and the merger.

use std::fmt;

use castffi_targets::TargetPlatform;
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Severity of a diagnostic, ordered from least to most severe.
///
/// - `Information` and `Warning` never interrupt extraction.
/// - `Error` compromises one platform's extraction (or marks a merge
///   contradiction); other platforms may still succeed.
/// - `Fatal` aborts the whole extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Information => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// A single diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Where the problem was found, if it maps to source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// The platform pass that produced it; `None` for cross-platform findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<TargetPlatform>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
            platform: None,
        }
    }

    pub fn information(message: impl Into<String>) -> Self {
        Self::new(Severity::Information, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Whether this diagnostic compromises the extraction it belongs to.
    pub fn is_error_or_worse(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(platform) = &self.platform {
            write!(f, "[{platform}] ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " @ {location}")?;
        }
        Ok(())
    }
}

/// Highest severity among `diagnostics`, if any.
pub fn highest_severity(diagnostics: &[Diagnostic]) -> Option<Severity> {
    diagnostics.iter().map(|d| d.severity).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Information < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn display_includes_platform_and_location() {
        let d = Diagnostic::error("bad field")
            .with_location(Location::new("lib.h", 3, 5))
            .with_platform(TargetPlatform::parse("x86_64-unknown-linux-gnu").unwrap());
        assert_eq!(
            d.to_string(),
            "[x86_64-unknown-linux-gnu] ERROR: bad field @ lib.h:3:5"
        );
    }

    #[test]
    fn highest_severity_of_mixed_list() {
        let list = vec![
            Diagnostic::information("a"),
            Diagnostic::error("b"),
            Diagnostic::warning("c"),
        ];
        assert_eq!(highest_severity(&list), Some(Severity::Error));
        assert_eq!(highest_severity(&[]), None);
    }
}

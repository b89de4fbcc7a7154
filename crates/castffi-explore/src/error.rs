//! Error types for exploration and extraction.

use std::path::PathBuf;

use castffi_ast::{AstError, Diagnostic, Severity, TargetPlatform};
use castffi_targets::TargetError;

/// Errors raised by front ends and supporting plumbing.
///
/// Problems found inside a header are never reported this way; they become
/// [`Diagnostic`]s.
#[derive(Debug, thiserror::Error)]
pub enum ExploreError {
    /// The front end has nothing for the requested platform.
    #[error("no translation unit available for platform {platform}")]
    MissingUnit { platform: TargetPlatform },

    /// A translation unit refers to cursors or types it does not contain.
    #[error("malformed translation unit: {0}")]
    InvalidUnit(String),

    /// A cursor dump could not be read.
    #[error("cannot read cursor dump {path}: {source}")]
    ReadDump {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Ast(#[from] AstError),
}

/// Result type alias for explorer operations.
pub type Result<T> = std::result::Result<T, ExploreError>;

/// Terminal failure of an extraction.
///
/// Carries every diagnostic gathered up to the point of failure, including
/// the Fatal one that stopped it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("extraction failed{}", cause_suffix(.diagnostics))]
pub struct ExtractionFailure {
    pub diagnostics: Vec<Diagnostic>,
}

fn first_fatal(diagnostics: &[Diagnostic]) -> Option<&Diagnostic> {
    diagnostics.iter().find(|d| d.severity == Severity::Fatal)
}

fn cause_suffix(diagnostics: &[Diagnostic]) -> String {
    first_fatal(diagnostics)
        .map(|cause| format!(": {cause}"))
        .unwrap_or_default()
}

impl ExtractionFailure {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// The first Fatal diagnostic, which is the cause of the failure.
    pub fn cause(&self) -> Option<&Diagnostic> {
        first_fatal(&self.diagnostics)
    }
}

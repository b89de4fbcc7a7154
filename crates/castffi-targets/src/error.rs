//! Error types for target platform operations.

/// Errors that can occur while interpreting a target platform.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// The triple could not be parsed.
    #[error("invalid target triple '{triple}': {detail}")]
    InvalidTriple {
        /// The rejected triple text.
        triple: String,
        /// Parser message.
        detail: String,
    },

    /// The triple parsed but has no known pointer width or data model.
    #[error("unsupported target '{triple}': {detail}")]
    Unsupported {
        /// The triple text.
        triple: String,
        /// Description of the missing information.
        detail: String,
    },

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type for target operations.
pub type Result<T> = std::result::Result<T, TargetError>;

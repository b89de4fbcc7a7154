//! AST error types.

use crate::node::NodeCategory;

/// Errors raised while assembling, reading or writing a tree.
#[derive(Debug, thiserror::Error)]
pub enum AstError {
    /// A node's name disagrees with the key it is stored under.
    #[error("{category} '{key}' carries mismatched name '{name}'")]
    NameMismatch {
        category: NodeCategory,
        key: String,
        name: String,
    },

    /// Two nodes were inserted under the same key of one category.
    #[error("duplicate {category} '{key}'")]
    DuplicateName { category: NodeCategory, key: String },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for AST operations.
pub type Result<T> = std::result::Result<T, AstError>;

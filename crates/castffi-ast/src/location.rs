//! Source locations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A position in a C source or header file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// File path as reported by the front end.
    pub file: String,
    /// 1-based line; 0 when unknown.
    #[serde(default)]
    pub line: u32,
    /// 1-based column; 0 when unknown.
    #[serde(default)]
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Whether the front end gave no file for this location (builtins, command line).
    pub fn is_unknown(&self) -> bool {
        self.file.is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "<unknown>");
        }
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

//! C header exploration and cross-platform reconciliation.
//!
//! Given a front end that can parse a header for a target platform, the
//! explorer walks each platform's translation unit, resolves every type to a
//! per-platform layout, applies the inclusion policy, and merges the
//! single-platform results into one [`castffi_ast::AbstractSyntaxTree`].
//!
//! ## Pipeline
//!
//! 1. [`frontend`]: a [`FrontEnd`] yields a [`ParsedUnit`] per platform
//! 2. [`traverse`]: [`explore`] walks it, consulting [`filter`] and [`resolve`]
//! 3. [`merge`]: single-platform trees fold into one, contradictions flagged
//! 4. [`extract`]: [`extract()`](extract::extract) runs the whole thing
//!
//! Problems found in headers are [`castffi_ast::Diagnostic`]s. Only the
//! terminal outcome of an extraction is an error value
//! ([`ExtractionFailure`]).

pub mod cursor;
pub mod error;
pub mod extract;
pub mod filter;
pub mod frontend;
pub mod merge;
pub mod resolve;
pub mod traverse;

pub use cursor::{
    CursorData, CursorId, CursorKind, NativeTypeKind, TranslationUnit, TranslationUnitBuilder,
    TypeData, TypeId,
};
pub use error::{ExploreError, ExtractionFailure, Result};
pub use extract::{extract, ExtractOptions, Extraction, PlatformFailurePolicy};
pub use filter::{Decision, FilterPolicy};
pub use frontend::{CursorDumpFrontEnd, FrontEnd, InMemoryFrontEnd, ParseRequest, ParsedUnit};
pub use merge::{merge, Merged, CONTRADICTION_ATTRIBUTE};
pub use resolve::{FieldLayout, RecordLayout, TypeResolver};
pub use traverse::{explore, PlatformExtraction};

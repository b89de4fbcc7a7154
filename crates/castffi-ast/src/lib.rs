//! Platform-annotated C abstract syntax tree for binding generators.
//!
//! The tree is the hand-off point between header exploration and code
//! generation. Every node records the set of target platforms it was observed
//! on, and every type carries a per-platform size/alignment table, so a single
//! tree describes a C library across all requested targets.
//!
//! ## Modules
//!
//! - [`location`]: source positions
//! - [`diagnostic`]: severities and diagnostics shared by every stage
//! - [`types`]: [`TypeInfo`] and per-platform layout tables
//! - [`node`]: the eight node categories and the [`Node`] variant
//! - [`tree`]: [`AbstractSyntaxTree`] and platform views
//! - [`assemble`]: building a tree while enforcing the name invariant
//! - [`json`]: the persisted interchange format

pub mod assemble;
pub mod diagnostic;
pub mod error;
pub mod json;
pub mod location;
pub mod node;
pub mod tree;
pub mod types;

pub use assemble::Assembler;
pub use castffi_targets::TargetPlatform;
pub use diagnostic::{Diagnostic, Severity};
pub use error::{AstError, Result};
pub use location::Location;
pub use node::{
    Attribute, CallingConvention, Enum, EnumValue, Function, FunctionParameter, FunctionPointer,
    MacroObject, Node, NodeCategory, NodeMeta, OpaqueType, Record, RecordField, RecordKind,
    TypeAlias, Variable,
};
pub use tree::AbstractSyntaxTree;
pub use types::{PlatformTable, TypeInfo, TypeKind, TypeLayout};

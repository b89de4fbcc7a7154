//! Target platform models for castffi.
//!
//! A [`TargetPlatform`] is a validated target triple. A [`PlatformModel`]
//! derives from it the C ABI facts the explorer needs when the front end does
//! not report a layout itself: pointer width, the C data model, scalar
//! alignment rules and the macros a compiler predefines for that target.

pub mod error;
pub mod platform;
pub mod triple;

pub use error::{Result, TargetError};
pub use platform::{CScalar, PlatformModel, ScalarLayout};
pub use triple::TargetPlatform;

//! The seam to the C parsing front end.
//!
//! The explorer never parses C itself. A [`FrontEnd`] turns a header and a
//! set of compiler arguments into a [`ParsedUnit`] for one target platform.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use castffi_ast::TargetPlatform;
use tracing::{debug, trace};

use crate::cursor::TranslationUnit;
use crate::error::{ExploreError, Result};

/// What to parse, and for which platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    pub file: PathBuf,
    /// Compiler arguments: `--target=`, `-I`, `-D` and any extras.
    pub arguments: Vec<String>,
    pub platform: TargetPlatform,
}

/// A translation unit held for the duration of one platform pass.
///
/// Front ends backed by native parsers hold memory proportional to the unit;
/// dropping the `ParsedUnit` releases it, whether the pass succeeded or not.
#[derive(Debug)]
pub struct ParsedUnit {
    platform: TargetPlatform,
    unit: TranslationUnit,
}

impl ParsedUnit {
    /// Wrap a unit after checking its internal references.
    pub fn new(platform: TargetPlatform, unit: TranslationUnit) -> Result<Self> {
        unit.validate()?;
        Ok(Self { platform, unit })
    }

    pub fn platform(&self) -> &TargetPlatform {
        &self.platform
    }

    pub fn unit(&self) -> &TranslationUnit {
        &self.unit
    }
}

impl Drop for ParsedUnit {
    fn drop(&mut self) {
        trace!(
            platform = %self.platform,
            cursors = self.unit.cursors.len(),
            "released translation unit"
        );
    }
}

/// A C parsing front end.
pub trait FrontEnd {
    /// Parse `request.file` for `request.platform`.
    fn parse(&self, request: &ParseRequest) -> Result<ParsedUnit>;
}

/// Serves prebuilt translation units, one per platform.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFrontEnd {
    units: BTreeMap<TargetPlatform, TranslationUnit>,
}

impl InMemoryFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, platform: TargetPlatform, unit: TranslationUnit) -> Self {
        self.insert(platform, unit);
        self
    }

    pub fn insert(&mut self, platform: TargetPlatform, unit: TranslationUnit) {
        self.units.insert(platform, unit);
    }
}

impl FrontEnd for InMemoryFrontEnd {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedUnit> {
        let unit = self
            .units
            .get(&request.platform)
            .cloned()
            .ok_or_else(|| ExploreError::MissingUnit {
                platform: request.platform.clone(),
            })?;
        ParsedUnit::new(request.platform.clone(), unit)
    }
}

/// Reads cursor dumps written by an external libclang dumper, one file per
/// platform at `<dir>/<triple>.json`.
#[derive(Debug, Clone)]
pub struct CursorDumpFrontEnd {
    directory: PathBuf,
}

impl CursorDumpFrontEnd {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Dump file for one platform.
    pub fn dump_path(&self, platform: &TargetPlatform) -> PathBuf {
        self.directory.join(format!("{platform}.json"))
    }
}

impl FrontEnd for CursorDumpFrontEnd {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedUnit> {
        let path = self.dump_path(&request.platform);
        if !path.exists() {
            return Err(ExploreError::MissingUnit {
                platform: request.platform.clone(),
            });
        }
        let text = fs::read_to_string(&path).map_err(|source| ExploreError::ReadDump {
            path: path.clone(),
            source,
        })?;
        let unit = TranslationUnit::from_json(&text)?;
        debug!(
            path = %path.display(),
            arguments = ?request.arguments,
            cursors = unit.cursors.len(),
            "loaded cursor dump"
        );
        ParsedUnit::new(request.platform.clone(), unit)
    }
}

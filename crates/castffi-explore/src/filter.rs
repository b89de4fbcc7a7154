//! Inclusion policy for declarations.
//!
//! Decides per declaration whether it belongs to the library being bound
//! (the root header and permitted include directories) and whether the user
//! asked for it to be dropped or exposed as an opaque type. The decision is a
//! pure function of the location, the name and the configuration, so every
//! platform pass sees the same membership.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use castffi_ast::Location;
use serde::{Deserialize, Serialize};

/// Outcome of filtering one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Include,
    Exclude,
    /// Emit as an opaque type: name and size only.
    IncludeAsOpaque,
}

/// Lexically normalize a path: drop `.` components and fold `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The inclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    root_file: PathBuf,
    include_directories: Vec<PathBuf>,
    ignored_names: BTreeSet<String>,
    opaque_names: BTreeSet<String>,
    ignored_files: Vec<PathBuf>,
}

impl FilterPolicy {
    pub fn new(root_file: impl AsRef<Path>) -> Self {
        Self {
            root_file: normalize(root_file.as_ref()),
            ..Default::default()
        }
    }

    pub fn with_include_directories<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.include_directories
            .extend(dirs.into_iter().map(|d| normalize(d.as_ref())));
        self
    }

    pub fn with_ignored_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_opaque_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opaque_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_ignored_files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ignored_files
            .extend(files.into_iter().map(|f| normalize(f.as_ref())));
        self
    }

    pub fn root_file(&self) -> &Path {
        &self.root_file
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_names.contains(name)
    }

    pub fn is_opaque(&self, name: &str) -> bool {
        self.opaque_names.contains(name)
    }

    /// Whether `file` belongs to the library: the root header or anything
    /// under a permitted include directory, and not an ignored file.
    pub fn is_user_file(&self, file: &str) -> bool {
        if file.is_empty() {
            return false;
        }
        let path = normalize(Path::new(file));
        if self.ignored_files.iter().any(|ignored| path.ends_with(ignored)) {
            return false;
        }
        path == self.root_file
            || self
                .include_directories
                .iter()
                .any(|dir| path.starts_with(dir))
    }

    /// Classify one declaration.
    pub fn decide(&self, location: &Location, name: &str) -> Decision {
        if self.is_ignored(name) {
            Decision::Exclude
        } else if self.is_opaque(name) {
            Decision::IncludeAsOpaque
        } else if !self.is_user_file(&location.file) {
            Decision::Exclude
        } else {
            Decision::Include
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FilterPolicy {
        FilterPolicy::new("include/lib.h")
            .with_include_directories(["include/lib"])
            .with_ignored_names(["lib_internal"])
            .with_opaque_names(["lib_handle"])
            .with_ignored_files(["include/lib/private.h"])
    }

    fn at(file: &str) -> Location {
        Location::new(file, 1, 1)
    }

    #[test]
    fn root_file_is_included() {
        assert_eq!(policy().decide(&at("include/lib.h"), "lib_init"), Decision::Include);
        assert_eq!(policy().decide(&at("./include/lib.h"), "lib_init"), Decision::Include);
    }

    #[test]
    fn include_directory_is_included() {
        assert_eq!(
            policy().decide(&at("include/lib/types.h"), "lib_point"),
            Decision::Include
        );
        assert_eq!(
            policy().decide(&at("include/lib/../lib/types.h"), "lib_point"),
            Decision::Include
        );
    }

    #[test]
    fn system_headers_are_excluded() {
        assert_eq!(policy().decide(&at("/usr/include/stdio.h"), "FILE"), Decision::Exclude);
        assert_eq!(policy().decide(&Location::default(), "__SIZE_TYPE__"), Decision::Exclude);
    }

    #[test]
    fn ignore_beats_opaque_and_location() {
        let p = policy().with_opaque_names(["lib_internal"]);
        assert_eq!(p.decide(&at("include/lib.h"), "lib_internal"), Decision::Exclude);
    }

    #[test]
    fn opaque_applies_outside_user_files() {
        assert_eq!(
            policy().decide(&at("/usr/include/other.h"), "lib_handle"),
            Decision::IncludeAsOpaque
        );
    }

    #[test]
    fn ignored_files_are_excluded() {
        assert_eq!(
            policy().decide(&at("include/lib/private.h"), "lib_secret"),
            Decision::Exclude
        );
    }

    #[test]
    fn prefix_of_directory_name_does_not_match() {
        assert_eq!(
            policy().decide(&at("include/library/x.h"), "x"),
            Decision::Exclude
        );
    }
}

//! The extraction pipeline: one exploration per platform, then merge.

use std::collections::BTreeMap;
use std::path::PathBuf;

use castffi_ast::{AbstractSyntaxTree, Diagnostic, TargetPlatform};
use castffi_targets::PlatformModel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ExtractionFailure;
use crate::filter::FilterPolicy;
use crate::frontend::{FrontEnd, ParseRequest};
use crate::merge::merge;
use crate::traverse::{explore, PlatformExtraction};

/// What to do when a platform fails with an Error but nothing Fatal happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformFailurePolicy {
    /// Drop the failed platform and merge the rest.
    #[default]
    Continue,
    /// Fail the whole extraction.
    Abort,
}

/// Configuration for one extraction, built once and shared by every
/// platform pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// The root header.
    pub input: PathBuf,
    pub include_directories: Vec<PathBuf>,
    /// Preprocessor defines, `NAME` or `NAME=VALUE`.
    pub defines: Vec<String>,
    /// Extra arguments passed through to the front end.
    pub compiler_arguments: Vec<String>,
    pub ignored_names: Vec<String>,
    pub opaque_names: Vec<String>,
    pub ignored_files: Vec<PathBuf>,
    /// Target platforms, in merge order.
    pub platforms: Vec<TargetPlatform>,
    pub failure_policy: PlatformFailurePolicy,
    /// Explore platforms concurrently.
    pub parallel: bool,
}

impl ExtractOptions {
    pub fn new(input: impl Into<PathBuf>, platforms: impl IntoIterator<Item = TargetPlatform>) -> Self {
        let mut unique: Vec<TargetPlatform> = Vec::new();
        for platform in platforms {
            if !unique.contains(&platform) {
                unique.push(platform);
            }
        }
        Self {
            input: input.into(),
            platforms: unique,
            ..Default::default()
        }
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy::new(&self.input)
            .with_include_directories(&self.include_directories)
            .with_ignored_names(self.ignored_names.iter().cloned())
            .with_opaque_names(self.opaque_names.iter().cloned())
            .with_ignored_files(&self.ignored_files)
    }

    /// Front-end request for one platform: target, include paths, platform
    /// and user defines, then any extra arguments.
    pub fn parse_request(&self, model: &PlatformModel) -> ParseRequest {
        let mut arguments = vec![format!("--target={}", model.platform)];
        arguments.extend(
            self.include_directories
                .iter()
                .map(|dir| format!("-I{}", dir.display())),
        );
        arguments.extend(model.defines.iter().map(|d| format!("-D{d}")));
        arguments.extend(self.defines.iter().map(|d| format!("-D{d}")));
        arguments.extend(self.compiler_arguments.iter().cloned());
        ParseRequest {
            file: self.input.clone(),
            arguments,
            platform: model.platform.clone(),
        }
    }
}

/// A successful extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The merged tree.
    pub tree: AbstractSyntaxTree,
    /// Every diagnostic from every platform and from the merge, in platform order.
    pub diagnostics: Vec<Diagnostic>,
    /// The single-platform trees that went into the merge.
    pub platform_trees: BTreeMap<TargetPlatform, AbstractSyntaxTree>,
}

fn explore_platform<F: FrontEnd>(
    front_end: &F,
    options: &ExtractOptions,
    policy: &FilterPolicy,
    platform: &TargetPlatform,
) -> PlatformExtraction {
    let failed = |diagnostic: Diagnostic| PlatformExtraction {
        platform: platform.clone(),
        tree: None,
        diagnostics: vec![diagnostic.with_platform(platform.clone())],
    };
    let model = match PlatformModel::for_platform(platform) {
        Ok(model) => model,
        Err(e) => return failed(Diagnostic::fatal(format!("unsupported platform: {e}"))),
    };
    let request = options.parse_request(&model);
    let parsed = match front_end.parse(&request) {
        Ok(parsed) => parsed,
        Err(e) => return failed(Diagnostic::fatal(format!("front end failed: {e}"))),
    };
    explore(parsed.unit(), policy, &model)
}

/// Extract and merge the tree for every requested platform.
///
/// Stops with an [`ExtractionFailure`] if any platform produced a Fatal
/// diagnostic, if a platform failed under [`PlatformFailurePolicy::Abort`],
/// or if no platform succeeded.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(input = %options.input.display(), platforms = options.platforms.len())
)]
pub fn extract<F: FrontEnd + Sync>(
    front_end: &F,
    options: &ExtractOptions,
) -> Result<Extraction, ExtractionFailure> {
    if options.platforms.is_empty() {
        return Err(ExtractionFailure::new(vec![Diagnostic::fatal(
            "no target platforms requested",
        )]));
    }
    let policy = options.filter_policy();
    let abort_on_error = options.failure_policy == PlatformFailurePolicy::Abort;

    let results: Vec<PlatformExtraction> = if options.parallel {
        options
            .platforms
            .par_iter()
            .map(|platform| explore_platform(front_end, options, &policy, platform))
            .collect()
    } else {
        let mut results = Vec::with_capacity(options.platforms.len());
        for platform in &options.platforms {
            let result = explore_platform(front_end, options, &policy, platform);
            let stop = result.is_fatal() || (abort_on_error && !result.succeeded());
            results.push(result);
            if stop {
                break;
            }
        }
        results
    };

    let mut diagnostics = Vec::new();
    let mut failed = Vec::new();
    let mut platform_trees = BTreeMap::new();
    let mut partials = Vec::new();
    for result in results {
        diagnostics.extend(result.diagnostics);
        match result.tree {
            Some(tree) => {
                platform_trees.insert(result.platform, tree.clone());
                partials.push(tree);
            }
            None => failed.push(result.platform),
        }
    }

    if diagnostics.iter().any(Diagnostic::is_fatal) {
        return Err(ExtractionFailure::new(diagnostics));
    }
    for platform in &failed {
        if abort_on_error {
            diagnostics.push(
                Diagnostic::fatal("platform extraction failed; aborting")
                    .with_platform(platform.clone()),
            );
            return Err(ExtractionFailure::new(diagnostics));
        }
        warn!(%platform, "platform extraction failed; continuing without it");
    }
    if partials.is_empty() {
        diagnostics.push(Diagnostic::fatal("no platform produced a tree"));
        return Err(ExtractionFailure::new(diagnostics));
    }

    let file_name = options.input.to_string_lossy();
    let merged = match merge(&file_name, partials) {
        Ok(merged) => merged,
        Err(fatal) => {
            diagnostics.push(fatal);
            return Err(ExtractionFailure::new(diagnostics));
        }
    };
    diagnostics.extend(merged.diagnostics);
    debug!(dropped = failed.len(), "platforms merged");
    info!(
        nodes = merged.tree.node_count(),
        platforms = merged.tree.platforms.len(),
        diagnostics = diagnostics.len(),
        "extraction complete"
    );
    Ok(Extraction {
        tree: merged.tree,
        diagnostics,
        platform_trees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use castffi_ast::Location;

    fn platform(triple: &str) -> TargetPlatform {
        TargetPlatform::parse(triple).unwrap()
    }

    #[test]
    fn duplicate_platforms_are_dropped() {
        let options = ExtractOptions::new(
            "lib.h",
            [
                platform("x86_64-unknown-linux-gnu"),
                platform("aarch64-apple-darwin"),
                platform("x86_64-unknown-linux-gnu"),
            ],
        );
        assert_eq!(options.platforms.len(), 2);
        assert_eq!(options.failure_policy, PlatformFailurePolicy::Continue);
    }

    #[test]
    fn parse_request_orders_arguments() {
        let mut options = ExtractOptions::new("include/lib.h", [platform("x86_64-pc-windows-msvc")]);
        options.include_directories = vec![PathBuf::from("include")];
        options.defines = vec!["LIB_STATIC".into()];
        options.compiler_arguments = vec!["-std=c11".into()];
        let model = PlatformModel::for_platform(&options.platforms[0]).unwrap();
        let request = options.parse_request(&model);

        assert_eq!(request.arguments[0], "--target=x86_64-pc-windows-msvc");
        assert_eq!(request.arguments[1], "-Iinclude");
        assert!(request.arguments.contains(&"-D_WIN32".to_string()));
        let user = request.arguments.iter().position(|a| a == "-DLIB_STATIC").unwrap();
        let platform_define = request.arguments.iter().position(|a| a == "-D_WIN32").unwrap();
        assert!(platform_define < user);
        assert_eq!(request.arguments.last().map(String::as_str), Some("-std=c11"));
    }

    #[test]
    fn filter_policy_reflects_options() {
        let mut options = ExtractOptions::new("include/lib.h", [platform("x86_64-unknown-linux-gnu")]);
        options.include_directories = vec![PathBuf::from("include/lib")];
        options.ignored_names = vec!["lib_private".into()];
        options.opaque_names = vec!["lib_ctx".into()];
        let policy = options.filter_policy();
        assert!(policy.is_ignored("lib_private"));
        assert!(policy.is_opaque("lib_ctx"));
        assert!(policy.is_user_file("include/lib/types.h"));
        assert!(!policy.is_user_file(&Location::new("/usr/include/stdint.h", 1, 1).file));
    }

    #[test]
    fn no_platforms_is_fatal() {
        let options = ExtractOptions::new("lib.h", Vec::<TargetPlatform>::new());
        let failure = extract(&crate::frontend::InMemoryFrontEnd::new(), &options).unwrap_err();
        assert!(failure.cause().is_some());
    }
}

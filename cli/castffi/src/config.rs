//! `castffi.toml` configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use castffi_ast::TargetPlatform;
use castffi_explore::{ExtractOptions, PlatformFailurePolicy};
use serde::{Deserialize, Serialize};

/// The top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CastffiConfig {
    /// What to parse (required).
    pub input: InputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[input]`: the header and how to compile it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputConfig {
    /// Root header file.
    pub header: PathBuf,
    /// Directories whose headers belong to the library.
    #[serde(default)]
    pub include_directories: Vec<PathBuf>,
    #[serde(default)]
    pub defines: Vec<String>,
    /// Extra arguments handed to the front end verbatim.
    #[serde(default)]
    pub clang_arguments: Vec<String>,
}

/// `[filter]`: names and files to drop or hide.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    #[serde(default)]
    pub ignored_names: Vec<String>,
    #[serde(default)]
    pub opaque_names: Vec<String>,
    #[serde(default)]
    pub ignored_files: Vec<PathBuf>,
}

/// `[targets]`: which platforms to extract and how to treat failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetsConfig {
    /// Target triples, in merge order.
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub on_platform_error: PlatformFailurePolicy,
    #[serde(default)]
    pub parallel: bool,
}

/// `[output]`: where results go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Merged tree; printed to stdout when absent.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Directory receiving one `<triple>.json` per platform.
    #[serde(default)]
    pub per_platform_directory: Option<PathBuf>,
}

fn rebase(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl CastffiConfig {
    /// Read a configuration file. Relative paths in it are resolved against
    /// the directory containing the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.rebase(base);
        Ok(config)
    }

    /// Parse configuration text without touching paths.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn rebase(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        rebase(base, &mut self.input.header);
        for dir in &mut self.input.include_directories {
            rebase(base, dir);
        }
        for file in &mut self.filter.ignored_files {
            rebase(base, file);
        }
        if let Some(file) = &mut self.output.file {
            rebase(base, file);
        }
        if let Some(dir) = &mut self.output.per_platform_directory {
            rebase(base, dir);
        }
    }

    /// Validated target platforms.
    pub fn platforms(&self) -> Result<Vec<TargetPlatform>> {
        if self.targets.platforms.is_empty() {
            bail!("no target platforms listed under [targets] platforms");
        }
        self.targets
            .platforms
            .iter()
            .map(|triple| {
                TargetPlatform::parse(triple)
                    .with_context(|| format!("invalid platform '{triple}' in [targets]"))
            })
            .collect()
    }

    /// Extraction options for this configuration.
    pub fn extract_options(&self) -> Result<ExtractOptions> {
        let mut options = ExtractOptions::new(&self.input.header, self.platforms()?);
        options.include_directories = self.input.include_directories.clone();
        options.defines = self.input.defines.clone();
        options.compiler_arguments = self.input.clang_arguments.clone();
        options.ignored_names = self.filter.ignored_names.clone();
        options.opaque_names = self.filter.opaque_names.clone();
        options.ignored_files = self.filter.ignored_files.clone();
        options.failure_policy = self.targets.on_platform_error;
        options.parallel = self.targets.parallel;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[input]
header = "include/lib.h"
include-directories = ["include/lib"]
defines = ["LIB_STATIC"]
clang-arguments = ["-std=c11"]

[filter]
ignored-names = ["lib_internal"]
opaque-names = ["lib_ctx"]
ignored-files = ["include/lib/private.h"]

[targets]
platforms = ["x86_64-unknown-linux-gnu", "aarch64-apple-darwin"]
on-platform-error = "abort"
parallel = true

[output]
file = "out/lib.ast.json"
per-platform-directory = "out/platforms"
"#;

    #[test]
    fn parse_full_config() {
        let config = CastffiConfig::parse(FULL).unwrap();
        assert_eq!(config.input.header, PathBuf::from("include/lib.h"));
        assert_eq!(config.filter.opaque_names, ["lib_ctx"]);
        assert_eq!(config.targets.on_platform_error, PlatformFailurePolicy::Abort);
        assert!(config.targets.parallel);

        let options = config.extract_options().unwrap();
        assert_eq!(options.platforms.len(), 2);
        assert_eq!(options.compiler_arguments, ["-std=c11"]);
        assert_eq!(options.failure_policy, PlatformFailurePolicy::Abort);
    }

    #[test]
    fn parse_minimal_config() {
        let config = CastffiConfig::parse(
            r#"
[input]
header = "lib.h"

[targets]
platforms = ["x86_64-pc-windows-msvc"]
"#,
        )
        .unwrap();
        assert!(config.filter.ignored_names.is_empty());
        assert_eq!(config.targets.on_platform_error, PlatformFailurePolicy::Continue);
        assert!(config.output.file.is_none());
    }

    #[test]
    fn missing_input_is_rejected() {
        assert!(CastffiConfig::parse("[targets]\nplatforms = []\n").is_err());
    }

    #[test]
    fn empty_or_bad_platforms_are_rejected() {
        let config = CastffiConfig::parse("[input]\nheader = \"lib.h\"\n").unwrap();
        assert!(config.extract_options().is_err());
        let config = CastffiConfig::parse(
            "[input]\nheader = \"lib.h\"\n[targets]\nplatforms = [\"not a triple\"]\n",
        )
        .unwrap();
        assert!(config.platforms().is_err());
    }

    #[test]
    fn load_resolves_paths_against_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("castffi.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = CastffiConfig::load(&path).unwrap();
        assert_eq!(config.input.header, dir.path().join("include/lib.h"));
        assert_eq!(config.input.include_directories[0], dir.path().join("include/lib"));
        assert_eq!(
            config.output.per_platform_directory,
            Some(dir.path().join("out/platforms"))
        );
    }
}

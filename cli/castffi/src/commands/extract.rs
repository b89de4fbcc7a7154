//! `castffi extract`: run the pipeline described by a configuration file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use castffi_ast::{json, Diagnostic, Severity};
use castffi_explore::{extract, CursorDumpFrontEnd, Extraction};
use tracing::debug;

use crate::config::CastffiConfig;

/// Cursor dumps are looked up here, relative to the configuration file, when
/// `--cursors` is not given.
pub const DEFAULT_CURSOR_DIRECTORY: &str = "cursors";

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.is_error_or_worse())
        .count();
    let warnings = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    if errors + warnings > 0 {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}

/// Write the single-platform trees as `<triple>.json` under `directory`.
fn write_platform_trees(extraction: &Extraction, directory: &Path) -> Result<()> {
    for (platform, tree) in &extraction.platform_trees {
        let path = directory.join(format!("{platform}.json"));
        json::write_file(tree, &path).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

/// Run an extraction and write its results.
///
/// `output` overrides `[output] file`; with neither, the merged tree goes to
/// stdout.
pub fn run(config_path: &Path, cursors: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let config = CastffiConfig::load(config_path)?;
    let options = config.extract_options()?;

    let cursors: PathBuf = match cursors {
        Some(dir) => dir.to_path_buf(),
        None => config_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(DEFAULT_CURSOR_DIRECTORY),
    };
    let front_end = CursorDumpFrontEnd::new(&cursors);

    let extraction = match extract(&front_end, &options) {
        Ok(extraction) => extraction,
        Err(failure) => {
            report(&failure.diagnostics);
            bail!("{failure}");
        }
    };
    report(&extraction.diagnostics);

    let output = output.map(Path::to_path_buf).or_else(|| config.output.file.clone());
    match &output {
        Some(path) => json::write_file(&extraction.tree, path)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            json::write_to(&extraction.tree, &mut lock)?;
            writeln!(lock)?;
        }
    }

    if let Some(directory) = &config.output.per_platform_directory {
        write_platform_trees(&extraction, directory)?;
        debug!(directory = %directory.display(), "wrote per-platform trees");
    }

    if let Some(path) = &output {
        eprintln!(
            "Extracted {} declaration(s) for {} platform(s) into {}",
            extraction.tree.node_count(),
            extraction.tree.platforms.len(),
            path.display()
        );
    }
    Ok(())
}

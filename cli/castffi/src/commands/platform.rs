//! `castffi platform`: show the C ABI model used for a target.

use std::fmt::{self, Write as _};

use anyhow::{bail, Result};
use castffi_ast::TargetPlatform;
use castffi_targets::{PlatformModel, ScalarLayout};

fn describe(model: &PlatformModel) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "=== Platform: {} ===", model.platform)?;
    writeln!(out, "Architecture: {}", model.arch)?;
    writeln!(out, "OS:           {}", model.os)?;
    writeln!(out, "Data model:   {}", model.data_model)?;
    writeln!(out)?;
    writeln!(out, "--- Scalars (size/align in bytes) ---")?;
    let scalars: [(&str, ScalarLayout); 10] = [
        ("pointer", model.pointer),
        ("short", model.short),
        ("int", model.int),
        ("long", model.long),
        ("long long", model.long_long),
        ("float", model.float),
        ("double", model.double),
        ("long double", model.long_double),
        ("wchar_t", model.wchar),
        ("enum", model.enum_default),
    ];
    for (name, layout) in scalars {
        writeln!(out, "  {name:<12} {}/{}", layout.size, layout.align)?;
    }
    writeln!(out)?;
    writeln!(out, "--- Predefined macros ---")?;
    for define in &model.defines {
        writeln!(out, "  {define}")?;
    }
    Ok(out)
}

/// Render the model for `triple` in `format` (`text`, the default, or `toml`).
pub fn render(triple: &str, format: Option<&str>) -> Result<String> {
    let platform = TargetPlatform::parse(triple)?;
    let model = PlatformModel::for_platform(&platform)?;
    match format.unwrap_or("text") {
        "text" => Ok(describe(&model)?),
        "toml" => Ok(model.to_toml()?),
        other => bail!("unknown format '{other}' (expected 'text' or 'toml')"),
    }
}

pub fn run(triple: &str, format: Option<&str>) -> Result<()> {
    print!("{}", render(triple, format)?);
    Ok(())
}

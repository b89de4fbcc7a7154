//! `castffi inspect`: summarize a persisted tree.

use std::fmt::{self, Write as _};
use std::path::Path;

use anyhow::{bail, Context, Result};
use castffi_ast::{json, AbstractSyntaxTree, NodeCategory, TargetPlatform};
use castffi_explore::CONTRADICTION_ATTRIBUTE;

/// Human-readable summary of a tree: platforms, then a count per category,
/// then any declarations kept apart because platforms disagreed on them.
pub fn summarize(tree: &AbstractSyntaxTree) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "=== {} ===", tree.file_name)?;
    writeln!(out, "Platforms:")?;
    for platform in &tree.platforms {
        writeln!(out, "  {platform}")?;
    }
    writeln!(out)?;
    writeln!(out, "Declarations:")?;
    for category in NodeCategory::ALL {
        writeln!(out, "  {:<18} {}", category.to_string(), tree.count(category))?;
    }
    writeln!(out, "  {:<18} {}", "total", tree.node_count())?;

    let contradicted: Vec<String> = tree
        .clone()
        .into_nodes()
        .into_iter()
        .filter(|node| node.meta().attribute(CONTRADICTION_ATTRIBUTE).is_some())
        .map(|node| format!("{} {}", node.category(), node.name()))
        .collect();
    if !contradicted.is_empty() {
        writeln!(out)?;
        writeln!(out, "Platform-specific shapes:")?;
        for entry in contradicted {
            writeln!(out, "  {entry}")?;
        }
    }
    Ok(out)
}

/// Print a summary of the tree stored at `file`, optionally restricted to
/// the declarations present on one platform.
pub fn run(file: &Path, platform: Option<&str>) -> Result<()> {
    let tree = json::read_file(file).with_context(|| format!("reading {}", file.display()))?;
    let tree = match platform {
        Some(triple) => {
            let platform = TargetPlatform::parse(triple)?;
            if !tree.platforms.contains(&platform) {
                bail!(
                    "{} has no declarations for {platform}; it covers: {}",
                    file.display(),
                    tree.platforms
                        .iter()
                        .map(TargetPlatform::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            tree.for_platform(&platform)
        }
        None => tree,
    };
    print!("{}", summarize(&tree)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use castffi_ast::{
        Assembler, Location, MacroObject, Node, NodeMeta, TypeInfo, TypeKind, TypeLayout, Variable,
    };

    const X64: &str = "x86_64-unknown-linux-gnu";
    const WIN: &str = "x86_64-pc-windows-msvc";

    fn platform(triple: &str) -> TargetPlatform {
        TargetPlatform::parse(triple).unwrap()
    }

    fn sample() -> AbstractSyntaxTree {
        let x64 = platform(X64);
        let win = platform(WIN);
        let mut assembler = Assembler::new("lib.h").platforms([x64.clone(), win.clone()]);
        let mut meta = NodeMeta::new("lib_count", Location::new("lib.h", 3, 12), x64.clone());
        meta.platforms.insert(win.clone());
        assembler
            .add_named(Node::Variable(Variable {
                meta,
                type_info: TypeInfo::new("int", TypeKind::Primitive)
                    .with_layout(x64.clone(), TypeLayout::new(4, 4))
                    .with_layout(win, TypeLayout::new(4, 4)),
            }))
            .unwrap();
        assembler
            .add_named(Node::MacroObject(MacroObject {
                meta: NodeMeta::new("LIB_UNIX", Location::new("lib.h", 1, 9), x64)
                    .with_attribute(CONTRADICTION_ATTRIBUTE, "LIB_UNIX"),
                type_info: TypeInfo::new("int", TypeKind::Primitive),
                value: "1".into(),
            }))
            .unwrap();
        assembler.finish()
    }

    #[test]
    fn summary_counts_every_category() {
        let summary = summarize(&sample()).unwrap();
        assert!(summary.contains("=== lib.h ==="));
        assert!(summary.contains(X64));
        assert!(summary.contains(WIN));
        for category in NodeCategory::ALL {
            assert!(summary.contains(&category.to_string()));
        }
        assert!(summary
            .lines()
            .any(|line| line.split_whitespace().eq(["total", "2"])));
        assert!(summary.contains("macro object LIB_UNIX"));
    }

    #[test]
    fn summary_of_empty_tree_has_no_shape_section() {
        let summary = summarize(&AbstractSyntaxTree::new("empty.h")).unwrap();
        assert!(summary.starts_with("=== empty.h ===\nPlatforms:\n\nDeclarations:\n"));
        assert!(summary
            .lines()
            .any(|line| line.split_whitespace().eq(["total", "0"])));
        assert!(!summary.contains("Platform-specific shapes"));
    }

    #[test]
    fn platform_view_and_unknown_platform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.json");
        json::write_file(&sample(), &path).unwrap();

        run(&path, None).unwrap();
        run(&path, Some(WIN)).unwrap();
        let err = run(&path, Some("aarch64-apple-darwin")).unwrap_err();
        assert!(err.to_string().contains("no declarations for aarch64-apple-darwin"));
        assert!(run(&dir.path().join("missing.json"), None).is_err());
    }
}

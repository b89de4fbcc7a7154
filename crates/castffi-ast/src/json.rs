//! JSON interchange format for [`AbstractSyntaxTree`].
//!
//! Output is pretty-printed with map keys in sorted order, so the same tree
//! always produces the same bytes. Node names are not written (they duplicate
//! the map keys) and empty or default-valued optional fields are omitted.
//! Every reader restores names from keys before handing the tree out.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{AstError, Result};
use crate::tree::AbstractSyntaxTree;

/// Serialize a tree to a pretty JSON string.
pub fn to_string(tree: &AbstractSyntaxTree) -> Result<String> {
    Ok(serde_json::to_string_pretty(tree)?)
}

/// Parse a tree from JSON text, restoring node names.
pub fn from_str(text: &str) -> Result<AbstractSyntaxTree> {
    let mut tree: AbstractSyntaxTree = serde_json::from_str(text)?;
    tree.fill_names()?;
    Ok(tree)
}

/// Serialize a tree into a writer.
pub fn write_to<W: Write>(tree: &AbstractSyntaxTree, writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, tree)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Parse a tree from a reader, restoring node names.
pub fn read_from<R: Read>(reader: &mut R) -> Result<AbstractSyntaxTree> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    from_str(&text)
}

/// Write a tree to `path`, creating parent directories as needed.
pub fn write_file(tree: &AbstractSyntaxTree, path: &Path) -> Result<()> {
    let result: Result<()> = (|| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut text = to_string(tree)?;
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    })();
    match &result {
        Ok(()) => tracing::info!(path = %path.display(), nodes = tree.node_count(), "wrote AST"),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to write AST"),
    }
    result
}

/// Read a tree from `path`, restoring node names.
pub fn read_file(path: &Path) -> Result<AbstractSyntaxTree> {
    let result = fs::read_to_string(path)
        .map_err(AstError::from)
        .and_then(|text| from_str(&text));
    match &result {
        Ok(tree) => tracing::info!(path = %path.display(), nodes = tree.node_count(), "read AST"),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "failed to read AST"),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use castffi_targets::TargetPlatform;

    use super::*;
    use crate::assemble::Assembler;
    use crate::location::Location;
    use crate::node::{
        CallingConvention, Enum, EnumValue, Function, FunctionParameter, MacroObject, Node,
        NodeMeta, Record, RecordField, RecordKind,
    };
    use crate::types::{PlatformTable, TypeInfo, TypeKind, TypeLayout};

    fn x64() -> TargetPlatform {
        TargetPlatform::parse("x86_64-unknown-linux-gnu").unwrap()
    }

    fn arm() -> TargetPlatform {
        TargetPlatform::parse("armv7-unknown-linux-gnueabihf").unwrap()
    }

    fn sample_tree() -> AbstractSyntaxTree {
        let int = TypeInfo::new("int", TypeKind::Primitive)
            .with_layout(x64(), TypeLayout::new(4, 4))
            .with_layout(arm(), TypeLayout::new(4, 4));
        let mut node_ptr = TypeInfo::new("Node*", TypeKind::Pointer)
            .with_layout(x64(), TypeLayout::new(8, 8))
            .with_layout(arm(), TypeLayout::new(4, 4))
            .with_inner(
                TypeInfo::new("Node", TypeKind::Record)
                    .with_layout(x64(), TypeLayout::new(16, 8))
                    .with_layout(arm(), TypeLayout::new(8, 4)),
            );
        node_ptr.pointer_depth = 1;

        let mut meta = NodeMeta::new("Node", Location::new("list.h", 1, 8), x64());
        meta.platforms.insert(arm());
        let mut inner_meta = NodeMeta::new("", Location::new("list.h", 3, 5), x64());
        inner_meta.platforms.insert(arm());
        let record = Record {
            meta: meta.clone(),
            record_kind: RecordKind::Struct,
            type_info: TypeInfo::new("Node", TypeKind::Record)
                .with_layout(x64(), TypeLayout::new(16, 8))
                .with_layout(arm(), TypeLayout::new(8, 4)),
            fields: vec![
                RecordField {
                    name: "next".into(),
                    type_info: node_ptr,
                    offset: PlatformTable::from([(x64(), 0), (arm(), 0)]),
                },
                RecordField {
                    name: "value".into(),
                    type_info: int.clone(),
                    offset: PlatformTable::from([(x64(), 8), (arm(), 4)]),
                },
            ],
            nested: BTreeMap::from([(
                "Node_Anonymous1".to_string(),
                Record {
                    meta: inner_meta,
                    record_kind: RecordKind::Union,
                    type_info: TypeInfo::new("Node_Anonymous1", TypeKind::Record),
                    fields: Vec::new(),
                    nested: BTreeMap::new(),
                },
            )]),
        };

        let mut assembler = Assembler::new("list.h").platforms([x64(), arm()]);
        assembler.add("Node", Node::Record(record)).unwrap();
        assembler
            .add(
                "list_push",
                Node::Function(Function {
                    meta: NodeMeta {
                        name: String::new(),
                        ..meta.clone()
                    },
                    calling_convention: CallingConvention::StdCall,
                    return_type: int.clone(),
                    parameters: vec![FunctionParameter {
                        name: "value".into(),
                        type_info: int.clone(),
                    }],
                    is_variadic: false,
                }),
            )
            .unwrap();
        assembler
            .add(
                "Color",
                Node::Enum(Enum {
                    meta: NodeMeta {
                        name: String::new(),
                        ..meta.clone()
                    },
                    integer_type: int.clone(),
                    integer_type_by_platform: BTreeMap::new(),
                    values: vec![
                        EnumValue { name: "RED".into(), value: 0 },
                        EnumValue { name: "BLUE".into(), value: -1 },
                    ],
                }),
            )
            .unwrap();
        assembler
            .add(
                "LIST_MAX",
                Node::MacroObject(MacroObject {
                    meta: NodeMeta {
                        name: String::new(),
                        ..meta
                    }
                    .with_attribute("kind", "EnumConstant"),
                    value: "64".into(),
                    type_info: int,
                }),
            )
            .unwrap();
        assembler.finish()
    }

    #[test]
    fn round_trip_preserves_tree() {
        let tree = sample_tree();
        let text = to_string(&tree).unwrap();
        let back = from_str(&text).unwrap();
        assert_eq!(back, tree);
        assert!(back.names_consistent());
        assert_eq!(back.records["Node"].nested["Node_Anonymous1"].meta.name, "Node_Anonymous1");
    }

    #[test]
    fn names_are_not_written() {
        let text = to_string(&sample_tree()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["records"]["Node"].get("name").is_none());
        assert!(value["functions"]["list_push"].get("name").is_none());
        // Field and parameter names are part of the shape and stay.
        assert_eq!(value["records"]["Node"]["fields"][0]["name"], "next");
    }

    #[test]
    fn defaults_are_omitted_and_restored() {
        let text = to_string(&sample_tree()).unwrap();
        assert!(!text.contains("is_variadic"));
        assert!(!text.contains("variables"));
        let back = from_str(&text).unwrap();
        assert!(back.variables.is_empty());
        assert!(!back.functions["list_push"].is_variadic);
    }

    #[test]
    fn mismatched_name_on_load_is_rejected() {
        let text = r#"{
            "file_name": "h.h",
            "platforms": ["x86_64-unknown-linux-gnu"],
            "variables": {
                "counter": {
                    "name": "other",
                    "location": { "file": "h.h", "line": 1, "column": 1 },
                    "platforms": ["x86_64-unknown-linux-gnu"],
                    "type_info": { "name": "int", "kind": "primitive" }
                }
            }
        }"#;
        assert!(matches!(from_str(text), Err(AstError::NameMismatch { .. })));
    }

    #[test]
    fn invalid_platform_is_a_json_error() {
        let text = r#"{ "file_name": "h.h", "platforms": ["not a triple at all"] }"#;
        assert!(matches!(from_str(text), Err(AstError::Json(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("ast.json");
        let tree = sample_tree();
        write_file(&tree, &path).unwrap();
        let back = read_file(&path).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn writer_round_trip() {
        let tree = sample_tree();
        let mut buf = Vec::new();
        write_to(&tree, &mut buf).unwrap();
        let back = read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_file(&dir.path().join("absent.json")),
            Err(AstError::Io(_))
        ));
    }
}

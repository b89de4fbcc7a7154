//! Cross-platform merge.
//!
//! Single-platform trees are folded together in the order given. Nodes that
//! share a category and name are compared by shape; equal shapes collapse into
//! one node whose platform set and layout tables are the union of the inputs.
//! Unequal shapes are a contradiction: each shape class is kept under a
//! platform-qualified key and an Error diagnostic names the platforms.
//!
//! A type name declared as different kinds of type on different platforms
//! (a record here, an opaque type there) is a contradiction too, even though
//! the nodes land in separate categories.

use std::collections::{BTreeMap, BTreeSet};

use castffi_ast::{
    AbstractSyntaxTree, Assembler, Attribute, Diagnostic, Location, Node, NodeCategory,
    TargetPlatform,
};
use tracing::{debug, warn};

/// A merged tree plus the contradictions found while merging.
#[derive(Debug, Clone)]
pub struct Merged {
    pub tree: AbstractSyntaxTree,
    pub diagnostics: Vec<Diagnostic>,
}

/// Attribute set on every node kept under a platform-qualified key; its value
/// is the declaration's own name.
pub const CONTRADICTION_ATTRIBUTE: &str = "contradiction";

/// Categories sharing the C type namespace.
const TYPE_CATEGORIES: [NodeCategory; 5] = [
    NodeCategory::Record,
    NodeCategory::OpaqueType,
    NodeCategory::Enum,
    NodeCategory::TypeAlias,
    NodeCategory::FunctionPointer,
];

type ShapeClasses = BTreeMap<(NodeCategory, String), Vec<Node>>;

fn platform_list(platforms: &BTreeSet<TargetPlatform>) -> String {
    platforms
        .iter()
        .map(TargetPlatform::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

/// Type names whose kind depends on the platform, with one Error each.
fn kind_conflicts(classes: &ShapeClasses) -> (BTreeSet<String>, Vec<Diagnostic>) {
    let mut kinds: BTreeMap<&str, Vec<(NodeCategory, BTreeSet<TargetPlatform>, &Location)>> =
        BTreeMap::new();
    for ((category, name), shapes) in classes {
        if !TYPE_CATEGORIES.contains(category) {
            continue;
        }
        let platforms = shapes
            .iter()
            .flat_map(|shape| shape.meta().platforms.iter().cloned())
            .collect();
        let location = &shapes[0].meta().location;
        kinds
            .entry(name.as_str())
            .or_default()
            .push((*category, platforms, location));
    }

    let mut names = BTreeSet::new();
    let mut diagnostics = Vec::new();
    for (name, seen) in kinds {
        if seen.len() < 2 || seen.iter().all(|(_, platforms, _)| *platforms == seen[0].1) {
            continue;
        }
        let groups: Vec<String> = seen
            .iter()
            .map(|(category, platforms, _)| format!("{category} on {}", platform_list(platforms)))
            .collect();
        warn!(%name, groups = ?groups, "type kind differs per platform");
        diagnostics.push(
            Diagnostic::error(format!(
                "'{name}' is a different kind of type per platform: {}",
                groups.join(", ")
            ))
            .with_location(seen[0].2.clone()),
        );
        names.insert(name.to_string());
    }
    (names, diagnostics)
}

/// Rename `node` to `name@group` and tag it with its declared name.
fn qualify(mut node: Node, name: &str) -> (String, Node) {
    let key = format!("{name}@{}", platform_list(&node.meta().platforms));
    let meta = node.meta_mut();
    meta.name = key.clone();
    if meta.attribute(CONTRADICTION_ATTRIBUTE).is_none() {
        meta.attributes.push(Attribute::new(CONTRADICTION_ATTRIBUTE, name));
    }
    (key, node)
}

/// Merge per-platform trees into one.
///
/// The error is a Fatal diagnostic and only occurs if assembly rejects a
/// node, which indicates a bug rather than a problem with the input.
#[tracing::instrument(level = "debug", skip_all, fields(file = %file_name, trees = partials.len()))]
pub fn merge(
    file_name: &str,
    partials: Vec<AbstractSyntaxTree>,
) -> Result<Merged, Diagnostic> {
    let mut platforms = BTreeSet::new();
    let mut classes = ShapeClasses::new();
    for partial in partials {
        platforms.extend(partial.platforms.iter().cloned());
        for node in partial.into_nodes() {
            let shapes = classes
                .entry((node.category(), node.name().to_string()))
                .or_default();
            if !shapes.iter_mut().any(|shape| shape.absorb(&node)) {
                shapes.push(node);
            }
        }
    }

    let (conflicting_kinds, mut diagnostics) = kind_conflicts(&classes);
    let mut assembler = Assembler::new(file_name).platforms(platforms);
    let add = |assembler: &mut Assembler, key: String, node: Node| {
        let location = node.meta().location.clone();
        assembler.add(key, node).map_err(|e| {
            Diagnostic::fatal(format!("internal error while merging: {e}")).with_location(location)
        })
    };

    for ((category, name), shapes) in classes {
        if shapes.len() == 1 {
            for node in shapes {
                if conflicting_kinds.contains(&name) {
                    let (key, node) = qualify(node, &name);
                    add(&mut assembler, key, node)?;
                } else {
                    add(&mut assembler, name.clone(), node)?;
                }
            }
            continue;
        }

        let groups: Vec<String> = shapes
            .iter()
            .map(|shape| platform_list(&shape.meta().platforms))
            .collect();
        warn!(%category, %name, groups = ?groups, "contradictory declarations");
        diagnostics.push(
            Diagnostic::error(format!(
                "{category} '{name}' has a different shape on {}",
                groups.join(" than on ")
            ))
            .with_location(shapes[0].meta().location.clone()),
        );
        for node in shapes {
            let (key, node) = qualify(node, &name);
            add(&mut assembler, key, node)?;
        }
    }

    let tree = assembler.finish();
    debug!(
        nodes = tree.node_count(),
        contradictions = diagnostics.len(),
        "merged platform trees"
    );
    Ok(Merged { tree, diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use castffi_ast::{
        NodeMeta, OpaqueType, PlatformTable, Record, RecordField, RecordKind, Severity, TypeInfo,
        TypeKind, TypeLayout, Variable,
    };

    const X64: &str = "x86_64-unknown-linux-gnu";
    const ARM: &str = "armv7-unknown-linux-gnueabihf";
    const WIN: &str = "x86_64-pc-windows-msvc";

    fn platform(triple: &str) -> TargetPlatform {
        TargetPlatform::parse(triple).unwrap()
    }

    fn partial(triple: &str, nodes: Vec<Node>) -> AbstractSyntaxTree {
        let mut assembler = Assembler::new("lib.h").platforms([platform(triple)]);
        for node in nodes {
            assembler.add_named(node).unwrap();
        }
        assembler.finish()
    }

    fn pointer_record(triple: &str, field: &str) -> Node {
        let p = platform(triple);
        let size = if triple.starts_with("armv7") { 4 } else { 8 };
        Node::Record(Record {
            meta: NodeMeta::new("Node", Location::new("lib.h", 1, 8), p.clone()),
            record_kind: RecordKind::Struct,
            type_info: TypeInfo::new("Node", TypeKind::Record)
                .with_layout(p.clone(), TypeLayout::new(size, size)),
            fields: vec![RecordField {
                name: field.to_string(),
                type_info: TypeInfo::new("Node*", TypeKind::Pointer)
                    .with_layout(p.clone(), TypeLayout::new(size, size)),
                offset: PlatformTable::from([(p, 0)]),
            }],
            nested: BTreeMap::new(),
        })
    }

    fn variable(triple: &str, name: &str) -> Node {
        Node::Variable(Variable {
            meta: NodeMeta::new(name, Location::new("lib.h", 9, 1), platform(triple)),
            type_info: TypeInfo::new("int", TypeKind::Primitive)
                .with_layout(platform(triple), TypeLayout::new(4, 4)),
        })
    }

    #[test]
    fn equal_shapes_collapse_with_layout_tables() {
        let merged = merge(
            "lib.h",
            vec![
                partial(X64, vec![pointer_record(X64, "next")]),
                partial(ARM, vec![pointer_record(ARM, "next")]),
            ],
        )
        .unwrap();

        assert!(merged.diagnostics.is_empty());
        let record = &merged.tree.records["Node"];
        assert_eq!(record.meta.platforms, BTreeSet::from([platform(X64), platform(ARM)]));
        let next = record.field("next").unwrap();
        assert_eq!(next.type_info.size_on(&platform(X64)), Some(8));
        assert_eq!(next.type_info.size_on(&platform(ARM)), Some(4));
        assert_eq!(merged.tree.platforms.len(), 2);
    }

    #[test]
    fn platform_specific_nodes_keep_their_subset() {
        let merged = merge(
            "lib.h",
            vec![
                partial(X64, vec![variable(X64, "shared"), variable(X64, "posix_only")]),
                partial(WIN, vec![variable(WIN, "shared")]),
                partial(ARM, vec![variable(ARM, "shared"), variable(ARM, "posix_only")]),
            ],
        )
        .unwrap();

        let only = &merged.tree.variables["posix_only"];
        assert_eq!(only.meta.platforms, BTreeSet::from([platform(X64), platform(ARM)]));
        assert!(!merged
            .tree
            .for_platform(&platform(WIN))
            .contains(NodeCategory::Variable, "posix_only"));
        assert_eq!(merged.tree.variables["shared"].meta.platforms.len(), 3);
    }

    #[test]
    fn different_shapes_are_contradictions() {
        let merged = merge(
            "lib.h",
            vec![
                partial(X64, vec![pointer_record(X64, "next")]),
                partial(WIN, vec![pointer_record(WIN, "link")]),
                partial(ARM, vec![pointer_record(ARM, "next")]),
            ],
        )
        .unwrap();

        assert_eq!(merged.diagnostics.len(), 1);
        let error = &merged.diagnostics[0];
        assert_eq!(error.severity, Severity::Error);
        assert!(error.message.contains(WIN));
        assert!(error.message.contains(X64));
        assert!(!merged.tree.records.contains_key("Node"));

        let keys: Vec<&str> = merged.tree.records.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "Node@armv7-unknown-linux-gnueabihf+x86_64-unknown-linux-gnu",
                "Node@x86_64-pc-windows-msvc",
            ]
        );
        for record in merged.tree.records.values() {
            assert_eq!(record.meta.attribute(CONTRADICTION_ATTRIBUTE), Some("Node"));
        }
        assert!(merged.tree.names_consistent());
    }

    #[test]
    fn categories_do_not_collide() {
        let x64 = platform(X64);
        let opaque = Node::OpaqueType(OpaqueType {
            meta: NodeMeta::new("shared", Location::default(), x64.clone()),
            type_info: TypeInfo::new("shared", TypeKind::Opaque),
        });
        let merged = merge("lib.h", vec![partial(X64, vec![variable(X64, "shared"), opaque])]).unwrap();
        assert!(merged.diagnostics.is_empty());
        assert_eq!(merged.tree.node_count(), 2);
    }

    fn opaque(triple: &str, name: &str) -> Node {
        Node::OpaqueType(OpaqueType {
            meta: NodeMeta::new(name, Location::new("lib.h", 1, 8), platform(triple)),
            type_info: TypeInfo::new(name, TypeKind::Opaque),
        })
    }

    #[test]
    fn record_on_one_platform_and_opaque_on_another_conflict() {
        let merged = merge(
            "lib.h",
            vec![
                partial(X64, vec![pointer_record(X64, "next")]),
                partial(WIN, vec![opaque(WIN, "Node")]),
            ],
        )
        .unwrap();

        assert_eq!(merged.diagnostics.len(), 1);
        let error = &merged.diagnostics[0];
        assert_eq!(error.severity, Severity::Error);
        assert!(error.message.contains(&format!("record on {X64}")));
        assert!(error.message.contains(&format!("opaque type on {WIN}")));

        let tree = &merged.tree;
        assert!(!tree.records.contains_key("Node"));
        assert!(!tree.opaque_types.contains_key("Node"));
        let record = &tree.records[&format!("Node@{X64}")];
        assert_eq!(record.meta.attribute(CONTRADICTION_ATTRIBUTE), Some("Node"));
        let hidden = &tree.opaque_types[&format!("Node@{WIN}")];
        assert_eq!(hidden.meta.attribute(CONTRADICTION_ATTRIBUTE), Some("Node"));
        assert!(tree.names_consistent());
    }

    #[test]
    fn kinds_on_the_same_platforms_do_not_conflict() {
        let merged = merge(
            "lib.h",
            vec![
                partial(X64, vec![pointer_record(X64, "next"), opaque(X64, "Node")]),
                partial(WIN, vec![pointer_record(WIN, "next"), opaque(WIN, "Node")]),
            ],
        )
        .unwrap();
        assert!(merged.diagnostics.is_empty());
        assert!(merged.tree.records.contains_key("Node"));
        assert!(merged.tree.opaque_types.contains_key("Node"));
    }
}

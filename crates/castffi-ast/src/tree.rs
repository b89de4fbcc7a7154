//! The aggregate root handed to code generators.

use std::collections::{BTreeMap, BTreeSet};

use castffi_targets::TargetPlatform;
use serde::{Deserialize, Serialize};

use crate::error::{AstError, Result};
use crate::node::{
    Enum, Function, FunctionPointer, MacroObject, Node, NodeCategory, NodeMeta, OpaqueType,
    Record, TypeAlias, Variable,
};

/// A C abstract syntax tree spanning one or more target platforms.
///
/// One map per node category, keyed by declaration name. A key is unique
/// within its category across all platforms; platform variance lives in each
/// node's platform set and layout tables.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbstractSyntaxTree {
    /// The input header the tree was extracted from.
    #[serde(default)]
    pub file_name: String,
    /// Platforms that contributed to this tree.
    #[serde(default)]
    pub platforms: BTreeSet<TargetPlatform>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, Function>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub records: BTreeMap<String, Record>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub enums: BTreeMap<String, Enum>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub type_aliases: BTreeMap<String, TypeAlias>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub opaque_types: BTreeMap<String, OpaqueType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub function_pointers: BTreeMap<String, FunctionPointer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub macro_objects: BTreeMap<String, MacroObject>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Variable>,
}

/// Name every value of `map` after its key, refusing to overwrite a different name.
fn claim_names<'a, T: 'a>(
    category: NodeCategory,
    map: impl IntoIterator<Item = (&'a String, &'a mut T)>,
    meta: impl Fn(&mut T) -> &mut NodeMeta,
) -> Result<()> {
    for (key, value) in map {
        let meta = meta(value);
        if meta.name.is_empty() {
            meta.name = key.clone();
        } else if meta.name != *key {
            return Err(AstError::NameMismatch {
                category,
                key: key.clone(),
                name: meta.name.clone(),
            });
        }
    }
    Ok(())
}

fn on_platform<T: Clone>(
    map: &BTreeMap<String, T>,
    platform: &TargetPlatform,
    meta: impl Fn(&T) -> &NodeMeta,
) -> BTreeMap<String, T> {
    map.iter()
        .filter(|(_, v)| meta(v).platforms.contains(platform))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl AbstractSyntaxTree {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Number of nodes in one category.
    pub fn count(&self, category: NodeCategory) -> usize {
        match category {
            NodeCategory::Function => self.functions.len(),
            NodeCategory::Record => self.records.len(),
            NodeCategory::Enum => self.enums.len(),
            NodeCategory::TypeAlias => self.type_aliases.len(),
            NodeCategory::OpaqueType => self.opaque_types.len(),
            NodeCategory::FunctionPointer => self.function_pointers.len(),
            NodeCategory::MacroObject => self.macro_objects.len(),
            NodeCategory::Variable => self.variables.len(),
        }
    }

    /// Total number of top-level nodes.
    pub fn node_count(&self) -> usize {
        NodeCategory::ALL.iter().map(|c| self.count(*c)).sum()
    }

    /// Whether a category holds `name`.
    pub fn contains(&self, category: NodeCategory, name: &str) -> bool {
        match category {
            NodeCategory::Function => self.functions.contains_key(name),
            NodeCategory::Record => self.records.contains_key(name),
            NodeCategory::Enum => self.enums.contains_key(name),
            NodeCategory::TypeAlias => self.type_aliases.contains_key(name),
            NodeCategory::OpaqueType => self.opaque_types.contains_key(name),
            NodeCategory::FunctionPointer => self.function_pointers.contains_key(name),
            NodeCategory::MacroObject => self.macro_objects.contains_key(name),
            NodeCategory::Variable => self.variables.contains_key(name),
        }
    }

    /// Insert a node under `key`, replacing nothing.
    pub(crate) fn insert(&mut self, key: String, node: Node) -> Result<()> {
        let category = node.category();
        if self.contains(category, &key) {
            return Err(AstError::DuplicateName { category, key });
        }
        match node {
            Node::Function(n) => self.functions.insert(key, n).map(|_| ()),
            Node::Record(n) => self.records.insert(key, n).map(|_| ()),
            Node::Enum(n) => self.enums.insert(key, n).map(|_| ()),
            Node::TypeAlias(n) => self.type_aliases.insert(key, n).map(|_| ()),
            Node::OpaqueType(n) => self.opaque_types.insert(key, n).map(|_| ()),
            Node::FunctionPointer(n) => self.function_pointers.insert(key, n).map(|_| ()),
            Node::MacroObject(n) => self.macro_objects.insert(key, n).map(|_| ()),
            Node::Variable(n) => self.variables.insert(key, n).map(|_| ()),
        };
        Ok(())
    }

    /// Consume the tree into its nodes, in category then key order.
    pub fn into_nodes(self) -> Vec<Node> {
        let mut nodes = Vec::with_capacity(self.node_count());
        nodes.extend(self.functions.into_values().map(Node::Function));
        nodes.extend(self.records.into_values().map(Node::Record));
        nodes.extend(self.enums.into_values().map(Node::Enum));
        nodes.extend(self.type_aliases.into_values().map(Node::TypeAlias));
        nodes.extend(self.opaque_types.into_values().map(Node::OpaqueType));
        nodes.extend(self.function_pointers.into_values().map(Node::FunctionPointer));
        nodes.extend(self.macro_objects.into_values().map(Node::MacroObject));
        nodes.extend(self.variables.into_values().map(Node::Variable));
        nodes
    }

    /// Assign every node's name from its key (nested records included).
    ///
    /// Names that are already set must match their key.
    pub fn fill_names(&mut self) -> Result<()> {
        claim_names(NodeCategory::Function, &mut self.functions, |n| &mut n.meta)?;
        claim_names(NodeCategory::Record, &mut self.records, |n| &mut n.meta)?;
        claim_names(NodeCategory::Enum, &mut self.enums, |n| &mut n.meta)?;
        claim_names(NodeCategory::TypeAlias, &mut self.type_aliases, |n| &mut n.meta)?;
        claim_names(NodeCategory::OpaqueType, &mut self.opaque_types, |n| &mut n.meta)?;
        claim_names(NodeCategory::FunctionPointer, &mut self.function_pointers, |n| &mut n.meta)?;
        claim_names(NodeCategory::MacroObject, &mut self.macro_objects, |n| &mut n.meta)?;
        claim_names(NodeCategory::Variable, &mut self.variables, |n| &mut n.meta)?;
        for record in self.records.values_mut() {
            record.fill_nested_names();
        }
        Ok(())
    }

    /// Whether every node's name equals its key.
    pub fn names_consistent(&self) -> bool {
        fn check<T>(map: &BTreeMap<String, T>, meta: impl Fn(&T) -> &NodeMeta) -> bool {
            map.iter().all(|(k, v)| meta(v).name == *k)
        }
        check(&self.functions, |n| &n.meta)
            && check(&self.records, |n| &n.meta)
            && check(&self.enums, |n| &n.meta)
            && check(&self.type_aliases, |n| &n.meta)
            && check(&self.opaque_types, |n| &n.meta)
            && check(&self.function_pointers, |n| &n.meta)
            && check(&self.macro_objects, |n| &n.meta)
            && check(&self.variables, |n| &n.meta)
    }

    /// The subtree of nodes observed on `platform`.
    pub fn for_platform(&self, platform: &TargetPlatform) -> AbstractSyntaxTree {
        AbstractSyntaxTree {
            file_name: self.file_name.clone(),
            platforms: self
                .platforms
                .iter()
                .filter(|p| *p == platform)
                .cloned()
                .collect(),
            functions: on_platform(&self.functions, platform, |n| &n.meta),
            records: on_platform(&self.records, platform, |n| &n.meta),
            enums: on_platform(&self.enums, platform, |n| &n.meta),
            type_aliases: on_platform(&self.type_aliases, platform, |n| &n.meta),
            opaque_types: on_platform(&self.opaque_types, platform, |n| &n.meta),
            function_pointers: on_platform(&self.function_pointers, platform, |n| &n.meta),
            macro_objects: on_platform(&self.macro_objects, platform, |n| &n.meta),
            variables: on_platform(&self.variables, platform, |n| &n.meta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::types::{TypeInfo, TypeKind};

    fn platform(s: &str) -> TargetPlatform {
        TargetPlatform::parse(s).unwrap()
    }

    fn variable(name: &str, platforms: &[&str]) -> Node {
        let mut meta = NodeMeta::new(name, Location::new("lib.h", 1, 1), platform(platforms[0]));
        meta.platforms.extend(platforms.iter().map(|p| platform(p)));
        Node::Variable(Variable {
            meta,
            type_info: TypeInfo::new("int", TypeKind::Primitive),
        })
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut tree = AbstractSyntaxTree::new("lib.h");
        tree.insert("x".into(), variable("x", &["x86_64-unknown-linux-gnu"]))
            .unwrap();
        let err = tree
            .insert("x".into(), variable("x", &["x86_64-unknown-linux-gnu"]))
            .unwrap_err();
        assert!(matches!(err, AstError::DuplicateName { .. }));
    }

    #[test]
    fn platform_view_filters_nodes() {
        let a = "x86_64-unknown-linux-gnu";
        let b = "aarch64-unknown-linux-gnu";
        let mut tree = AbstractSyntaxTree::new("lib.h");
        tree.platforms = [platform(a), platform(b)].into_iter().collect();
        tree.insert("both".into(), variable("both", &[a, b])).unwrap();
        tree.insert("only_a".into(), variable("only_a", &[a])).unwrap();

        let view = tree.for_platform(&platform(b));
        assert_eq!(view.node_count(), 1);
        assert!(view.variables.contains_key("both"));
        assert_eq!(view.platforms.len(), 1);
    }

    #[test]
    fn fill_names_detects_mismatch() {
        let mut tree = AbstractSyntaxTree::new("lib.h");
        tree.variables.insert(
            "key".into(),
            match variable("other", &["x86_64-unknown-linux-gnu"]) {
                Node::Variable(v) => v,
                _ => unreachable!(),
            },
        );
        assert!(matches!(
            tree.fill_names(),
            Err(AstError::NameMismatch { .. })
        ));
    }

    #[test]
    fn into_nodes_round_trips_counts() {
        let mut tree = AbstractSyntaxTree::new("lib.h");
        tree.insert("a".into(), variable("a", &["x86_64-unknown-linux-gnu"]))
            .unwrap();
        tree.insert("b".into(), variable("b", &["x86_64-unknown-linux-gnu"]))
            .unwrap();
        assert_eq!(tree.into_nodes().len(), 2);
    }
}

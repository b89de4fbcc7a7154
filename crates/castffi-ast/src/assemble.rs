//! Final assembly of merged nodes into an [`AbstractSyntaxTree`].

use std::collections::BTreeSet;

use castffi_targets::TargetPlatform;

use crate::error::{AstError, Result};
use crate::node::Node;
use crate::tree::AbstractSyntaxTree;

/// Collects keyed nodes into a tree.
///
/// Every node is named after the key it is stored under. A node arriving with
/// no name takes its key; a node arriving with a different name is rejected.
#[derive(Debug, Default)]
pub struct Assembler {
    tree: AbstractSyntaxTree,
}

impl Assembler {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            tree: AbstractSyntaxTree::new(file_name),
        }
    }

    /// Record the platforms that contributed to the tree.
    pub fn platforms(mut self, platforms: impl IntoIterator<Item = TargetPlatform>) -> Self {
        self.tree.platforms = platforms.into_iter().collect::<BTreeSet<_>>();
        self
    }

    /// Add `node` under `key`.
    pub fn add(&mut self, key: impl Into<String>, mut node: Node) -> Result<()> {
        let key = key.into();
        let meta = node.meta_mut();
        if meta.name.is_empty() {
            meta.name = key.clone();
        } else if meta.name != key {
            return Err(AstError::NameMismatch {
                category: node.category(),
                key,
                name: node.name().to_string(),
            });
        }
        if let Node::Record(record) = &mut node {
            record.fill_nested_names();
        }
        tracing::trace!(category = %node.category(), key = %key, "assembled node");
        self.tree.insert(key, node)
    }

    /// Add a node under its own name.
    pub fn add_named(&mut self, node: Node) -> Result<()> {
        let key = node.name().to_string();
        self.add(key, node)
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.tree.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(self) -> AbstractSyntaxTree {
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::node::{NodeCategory, NodeMeta, OpaqueType};
    use crate::types::{TypeInfo, TypeKind};

    fn opaque(name: &str) -> Node {
        let platform = TargetPlatform::parse("x86_64-unknown-linux-gnu").unwrap();
        Node::OpaqueType(OpaqueType {
            meta: NodeMeta::new(name, Location::new("h.h", 2, 1), platform),
            type_info: TypeInfo::new("handle_t", TypeKind::Opaque),
        })
    }

    #[test]
    fn empty_name_takes_key() {
        let mut assembler = Assembler::new("h.h");
        assembler.add("handle_t", opaque("")).unwrap();
        let tree = assembler.finish();
        assert_eq!(tree.opaque_types["handle_t"].meta.name, "handle_t");
        assert!(tree.names_consistent());
    }

    #[test]
    fn matching_name_is_accepted() {
        let mut assembler = Assembler::new("h.h");
        assembler.add_named(opaque("handle_t")).unwrap();
        assert_eq!(assembler.len(), 1);
        assert!(assembler.finish().contains(NodeCategory::OpaqueType, "handle_t"));
    }

    #[test]
    fn mismatched_name_is_rejected() {
        let mut assembler = Assembler::new("h.h");
        let err = assembler.add("handle_t", opaque("other")).unwrap_err();
        assert!(matches!(err, AstError::NameMismatch { .. }));
        assert!(assembler.is_empty());
    }

    #[test]
    fn platforms_are_recorded() {
        let platforms = ["x86_64-unknown-linux-gnu", "aarch64-apple-darwin"]
            .iter()
            .map(|p| TargetPlatform::parse(p).unwrap());
        let tree = Assembler::new("h.h").platforms(platforms).finish();
        assert_eq!(tree.platforms.len(), 2);
        assert_eq!(tree.file_name, "h.h");
    }
}

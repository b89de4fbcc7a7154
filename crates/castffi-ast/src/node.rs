//! Node categories of the C abstract syntax tree.
//!
//! Each category is a plain struct sharing a flattened [`NodeMeta`] header.
//! [`Node`] is the closed tagged variant over all of them and is what the
//! explorer and the merger pass around before the tree is assembled.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use castffi_targets::TargetPlatform;
use serde::{Deserialize, Serialize};

use crate::location::Location;
use crate::types::{absorb_targets, PlatformTable, TypeInfo};

/// Free-form provenance tag attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Fields every node carries.
///
/// `name` is not written to the interchange format: it always equals the key
/// the node is stored under and is restored on load.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub platforms: BTreeSet<TargetPlatform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl NodeMeta {
    /// Header for a node observed on a single platform.
    pub fn new(name: impl Into<String>, location: Location, platform: TargetPlatform) -> Self {
        Self {
            name: name.into(),
            location,
            platforms: BTreeSet::from([platform]),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    /// Value of the first attribute with `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    fn absorb(&mut self, other: &NodeMeta) {
        self.platforms.extend(other.platforms.iter().cloned());
        for attr in &other.attributes {
            if !self.attributes.contains(attr) {
                self.attributes.push(attr.clone());
            }
        }
    }
}

/// Calling convention of a function or function pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingConvention {
    #[default]
    Cdecl,
    StdCall,
    FastCall,
    VectorCall,
}

impl CallingConvention {
    fn is_default(&self) -> bool {
        *self == CallingConvention::Cdecl
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn params_same_shape(a: &[FunctionParameter], b: &[FunctionParameter]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.name == y.name && x.type_info.same_shape(&y.type_info))
}

fn params_absorb(mine: &mut [FunctionParameter], theirs: &[FunctionParameter]) {
    for (m, t) in mine.iter_mut().zip(theirs) {
        m.type_info.absorb_layouts(&t.type_info);
    }
}

/// A named parameter of a function or function pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParameter {
    /// Parameter name; empty when the declaration leaves it unnamed.
    #[serde(default)]
    pub name: String,
    pub type_info: TypeInfo,
}

/// An exported C function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    #[serde(flatten)]
    pub meta: NodeMeta,
    #[serde(default, skip_serializing_if = "CallingConvention::is_default")]
    pub calling_convention: CallingConvention,
    pub return_type: TypeInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<FunctionParameter>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_variadic: bool,
}

/// Whether a record is a struct or a union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Struct,
    Union,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Struct => write!(f, "struct"),
            RecordKind::Union => write!(f, "union"),
        }
    }
}

/// One field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub type_info: TypeInfo,
    /// Byte offset from the start of the record, per platform.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub offset: PlatformTable<u64>,
}

/// A struct or union with its field layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub record_kind: RecordKind,
    /// The record's own type, carrying its per-platform size and alignment.
    pub type_info: TypeInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<RecordField>,
    /// Anonymous aggregates owned by this record, keyed by synthesized name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested: BTreeMap<String, Record>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn same_shape(&self, other: &Record) -> bool {
        self.record_kind == other.record_kind
            && self.type_info.same_shape(&other.type_info)
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.type_info.same_shape(&b.type_info))
            && self.nested.len() == other.nested.len()
            && self
                .nested
                .iter()
                .all(|(k, n)| other.nested.get(k).is_some_and(|o| n.same_shape(o)))
    }

    fn absorb(&mut self, other: &Record) {
        self.meta.absorb(&other.meta);
        self.type_info.absorb_layouts(&other.type_info);
        for (mine, theirs) in self.fields.iter_mut().zip(&other.fields) {
            mine.type_info.absorb_layouts(&theirs.type_info);
            for (platform, offset) in &theirs.offset {
                mine.offset.entry(platform.clone()).or_insert(*offset);
            }
        }
        for (key, nested) in self.nested.iter_mut() {
            if let Some(theirs) = other.nested.get(key) {
                nested.absorb(theirs);
            }
        }
    }

    /// Restore nested record names from their keys.
    pub(crate) fn fill_nested_names(&mut self) {
        for (key, nested) in self.nested.iter_mut() {
            nested.meta.name = key.clone();
            nested.fill_nested_names();
        }
    }
}

/// One enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// A named C enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    #[serde(flatten)]
    pub meta: NodeMeta,
    /// Underlying integer type.
    pub integer_type: TypeInfo,
    /// Integer type per platform, filled only when platforms disagree on it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub integer_type_by_platform: PlatformTable<TypeInfo>,
    /// Enumerators in declaration order.
    #[serde(default)]
    pub values: Vec<EnumValue>,
}

/// A typedef that is not folded into another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAlias {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub underlying: TypeInfo,
    /// Aliased type per platform, filled only when platforms disagree on it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub underlying_by_platform: PlatformTable<TypeInfo>,
}

impl Enum {
    /// Integer type as seen on one platform.
    pub fn integer_type_on(&self, platform: &TargetPlatform) -> &TypeInfo {
        self.integer_type_by_platform
            .get(platform)
            .unwrap_or(&self.integer_type)
    }
}

impl TypeAlias {
    /// Aliased type as seen on one platform.
    pub fn underlying_on(&self, platform: &TargetPlatform) -> &TypeInfo {
        self.underlying_by_platform
            .get(platform)
            .unwrap_or(&self.underlying)
    }
}

/// Typedef targets agree when they reduce to the same kind of thing; the
/// spelling of the target may vary per platform.
fn targets_same_shape(a: &TypeInfo, b: &TypeInfo) -> bool {
    a.same_shape(b)
        || (a.canonical_kind() == b.canonical_kind() && a.pointer_depth == b.pointer_depth)
}

/// A type exposed by name and size only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueType {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub type_info: TypeInfo,
}

/// A function pointer type lifted out of fields, parameters and typedefs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPointer {
    #[serde(flatten)]
    pub meta: NodeMeta,
    /// The pointer type itself (pointer-sized layout).
    pub type_info: TypeInfo,
    #[serde(default, skip_serializing_if = "CallingConvention::is_default")]
    pub calling_convention: CallingConvention,
    pub return_type: TypeInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<FunctionParameter>,
}

impl FunctionPointer {
    /// Same signature and calling convention, ignoring layouts.
    pub fn same_shape(&self, other: &FunctionPointer) -> bool {
        self.calling_convention == other.calling_convention
            && self.type_info.same_shape(&other.type_info)
            && self.return_type.same_shape(&other.return_type)
            && params_same_shape(&self.parameters, &other.parameters)
    }
}

/// An object-like macro that reduced to a single literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroObject {
    #[serde(flatten)]
    pub meta: NodeMeta,
    /// Literal text as written, e.g. `42`, `0x10u`, `1.5f`, `"abc"`, `'x'`.
    pub value: String,
    pub type_info: TypeInfo,
}

/// An exported global variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(flatten)]
    pub meta: NodeMeta,
    pub type_info: TypeInfo,
}

/// The category mapping a node lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    Function,
    Record,
    Enum,
    TypeAlias,
    OpaqueType,
    FunctionPointer,
    MacroObject,
    Variable,
}

impl NodeCategory {
    pub const ALL: [NodeCategory; 8] = [
        NodeCategory::Function,
        NodeCategory::Record,
        NodeCategory::Enum,
        NodeCategory::TypeAlias,
        NodeCategory::OpaqueType,
        NodeCategory::FunctionPointer,
        NodeCategory::MacroObject,
        NodeCategory::Variable,
    ];
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeCategory::Function => "function",
            NodeCategory::Record => "record",
            NodeCategory::Enum => "enum",
            NodeCategory::TypeAlias => "type alias",
            NodeCategory::OpaqueType => "opaque type",
            NodeCategory::FunctionPointer => "function pointer",
            NodeCategory::MacroObject => "macro object",
            NodeCategory::Variable => "variable",
        };
        f.write_str(s)
    }
}

/// Any node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Function(Function),
    Record(Record),
    Enum(Enum),
    TypeAlias(TypeAlias),
    OpaqueType(OpaqueType),
    FunctionPointer(FunctionPointer),
    MacroObject(MacroObject),
    Variable(Variable),
}

impl Node {
    pub fn category(&self) -> NodeCategory {
        match self {
            Node::Function(_) => NodeCategory::Function,
            Node::Record(_) => NodeCategory::Record,
            Node::Enum(_) => NodeCategory::Enum,
            Node::TypeAlias(_) => NodeCategory::TypeAlias,
            Node::OpaqueType(_) => NodeCategory::OpaqueType,
            Node::FunctionPointer(_) => NodeCategory::FunctionPointer,
            Node::MacroObject(_) => NodeCategory::MacroObject,
            Node::Variable(_) => NodeCategory::Variable,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Function(n) => &n.meta,
            Node::Record(n) => &n.meta,
            Node::Enum(n) => &n.meta,
            Node::TypeAlias(n) => &n.meta,
            Node::OpaqueType(n) => &n.meta,
            Node::FunctionPointer(n) => &n.meta,
            Node::MacroObject(n) => &n.meta,
            Node::Variable(n) => &n.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut NodeMeta {
        match self {
            Node::Function(n) => &mut n.meta,
            Node::Record(n) => &mut n.meta,
            Node::Enum(n) => &mut n.meta,
            Node::TypeAlias(n) => &mut n.meta,
            Node::OpaqueType(n) => &mut n.meta,
            Node::FunctionPointer(n) => &mut n.meta,
            Node::MacroObject(n) => &mut n.meta,
            Node::Variable(n) => &mut n.meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// Structural equality ignoring per-platform layouts, locations,
    /// platform sets and attributes.
    pub fn same_shape(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Function(a), Node::Function(b)) => {
                a.calling_convention == b.calling_convention
                    && a.is_variadic == b.is_variadic
                    && a.return_type.same_shape(&b.return_type)
                    && params_same_shape(&a.parameters, &b.parameters)
            }
            (Node::Record(a), Node::Record(b)) => a.same_shape(b),
            // The integer type is ABI-chosen and kept per platform.
            (Node::Enum(a), Node::Enum(b)) => a.values == b.values,
            (Node::TypeAlias(a), Node::TypeAlias(b)) => {
                targets_same_shape(&a.underlying, &b.underlying)
            }
            (Node::OpaqueType(a), Node::OpaqueType(b)) => a.type_info.same_shape(&b.type_info),
            (Node::FunctionPointer(a), Node::FunctionPointer(b)) => a.same_shape(b),
            (Node::MacroObject(a), Node::MacroObject(b)) => {
                a.value == b.value && a.type_info.same_shape(&b.type_info)
            }
            (Node::Variable(a), Node::Variable(b)) => a.type_info.same_shape(&b.type_info),
            _ => false,
        }
    }

    /// Merge a same-shaped node from another platform into this one: platform
    /// sets are unioned and every layout table gains the other platform's entries.
    ///
    /// Returns `false` (leaving `self` untouched) if the shapes differ.
    pub fn absorb(&mut self, other: &Node) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        match (self, other) {
            (Node::Function(a), Node::Function(b)) => {
                a.meta.absorb(&b.meta);
                a.return_type.absorb_layouts(&b.return_type);
                params_absorb(&mut a.parameters, &b.parameters);
            }
            (Node::Record(a), Node::Record(b)) => a.absorb(b),
            (Node::Enum(a), Node::Enum(b)) => {
                absorb_targets(
                    &mut a.integer_type,
                    &mut a.integer_type_by_platform,
                    &a.meta.platforms,
                    &b.integer_type,
                    &b.integer_type_by_platform,
                    &b.meta.platforms,
                );
                a.meta.absorb(&b.meta);
            }
            (Node::TypeAlias(a), Node::TypeAlias(b)) => {
                absorb_targets(
                    &mut a.underlying,
                    &mut a.underlying_by_platform,
                    &a.meta.platforms,
                    &b.underlying,
                    &b.underlying_by_platform,
                    &b.meta.platforms,
                );
                a.meta.absorb(&b.meta);
            }
            (Node::OpaqueType(a), Node::OpaqueType(b)) => {
                a.meta.absorb(&b.meta);
                a.type_info.absorb_layouts(&b.type_info);
            }
            (Node::FunctionPointer(a), Node::FunctionPointer(b)) => {
                a.meta.absorb(&b.meta);
                a.type_info.absorb_layouts(&b.type_info);
                a.return_type.absorb_layouts(&b.return_type);
                params_absorb(&mut a.parameters, &b.parameters);
            }
            (Node::MacroObject(a), Node::MacroObject(b)) => {
                a.meta.absorb(&b.meta);
                a.type_info.absorb_layouts(&b.type_info);
            }
            (Node::Variable(a), Node::Variable(b)) => {
                a.meta.absorb(&b.meta);
                a.type_info.absorb_layouts(&b.type_info);
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeKind, TypeLayout};

    fn platform(s: &str) -> TargetPlatform {
        TargetPlatform::parse(s).unwrap()
    }

    fn record_on(p: &str, fields: &[(&str, &str)]) -> Node {
        let plat = platform(p);
        Node::Record(Record {
            meta: NodeMeta::new("Pair", Location::new("pair.h", 1, 8), plat.clone()),
            record_kind: RecordKind::Struct,
            type_info: TypeInfo::new("Pair", TypeKind::Record)
                .with_layout(plat.clone(), TypeLayout::new(8, 4)),
            fields: fields
                .iter()
                .enumerate()
                .map(|(i, (name, ty))| RecordField {
                    name: name.to_string(),
                    type_info: TypeInfo::new(*ty, TypeKind::Primitive)
                        .with_layout(plat.clone(), TypeLayout::new(4, 4)),
                    offset: PlatformTable::from([(plat.clone(), i as u64 * 4)]),
                })
                .collect(),
            nested: BTreeMap::new(),
        })
    }

    #[test]
    fn same_record_on_two_platforms_absorbs() {
        let mut a = record_on("x86_64-unknown-linux-gnu", &[("a", "int"), ("b", "int")]);
        let b = record_on("aarch64-unknown-linux-gnu", &[("a", "int"), ("b", "int")]);
        assert!(a.absorb(&b));
        let Node::Record(r) = &a else { panic!("not a record") };
        assert_eq!(r.meta.platforms.len(), 2);
        assert_eq!(r.field("b").unwrap().offset.len(), 2);
    }

    #[test]
    fn different_fields_do_not_absorb() {
        let mut a = record_on("x86_64-unknown-linux-gnu", &[("a", "int"), ("b", "int")]);
        let b = record_on("aarch64-unknown-linux-gnu", &[("a", "int"), ("c", "int")]);
        assert!(!a.absorb(&b));
        assert_eq!(a.meta().platforms.len(), 1);
    }

    #[test]
    fn categories_never_share_shape() {
        let plat = platform("x86_64-unknown-linux-gnu");
        let ty = TypeInfo::new("handle", TypeKind::Opaque);
        let opaque = Node::OpaqueType(OpaqueType {
            meta: NodeMeta::new("handle", Location::default(), plat.clone()),
            type_info: ty.clone(),
        });
        let var = Node::Variable(Variable {
            meta: NodeMeta::new("handle", Location::default(), plat),
            type_info: ty,
        });
        assert!(!opaque.same_shape(&var));
    }

    fn alias_on(p: &str, target: &str) -> Node {
        let plat = platform(p);
        Node::TypeAlias(TypeAlias {
            meta: NodeMeta::new("int64_t", Location::new("stdint.h", 4, 1), plat.clone()),
            underlying: TypeInfo::new(target, TypeKind::Primitive)
                .with_layout(plat, TypeLayout::new(8, 8)),
            underlying_by_platform: BTreeMap::new(),
        })
    }

    #[test]
    fn alias_targets_vary_per_platform() {
        let win = platform("x86_64-pc-windows-msvc");
        let mut merged = alias_on("x86_64-unknown-linux-gnu", "long");
        assert!(merged.absorb(&alias_on("aarch64-unknown-linux-gnu", "long")));
        assert!(merged.absorb(&alias_on("x86_64-pc-windows-msvc", "long long")));
        let Node::TypeAlias(alias) = &merged else { panic!("not an alias") };
        assert_eq!(alias.meta.platforms.len(), 3);
        assert_eq!(alias.underlying.name, "long");
        assert_eq!(alias.underlying_by_platform.len(), 3);
        assert_eq!(alias.underlying_on(&win).name, "long long");
        assert_eq!(alias.underlying_on(&platform("aarch64-unknown-linux-gnu")).name, "long");
    }

    #[test]
    fn alias_to_pointer_and_integer_do_not_absorb() {
        let mut merged = alias_on("x86_64-unknown-linux-gnu", "long");
        let mut pointer = alias_on("x86_64-pc-windows-msvc", "void*");
        if let Node::TypeAlias(alias) = &mut pointer {
            alias.underlying.kind = TypeKind::Pointer;
            alias.underlying.pointer_depth = 1;
        }
        assert!(!merged.absorb(&pointer));
    }

    #[test]
    fn enum_integer_type_is_per_platform() {
        let enum_on = |p: &str, integer: &str| {
            let plat = platform(p);
            Node::Enum(Enum {
                meta: NodeMeta::new("color", Location::new("color.h", 1, 6), plat.clone()),
                integer_type: TypeInfo::new(integer, TypeKind::Primitive)
                    .with_layout(plat, TypeLayout::new(4, 4)),
                integer_type_by_platform: BTreeMap::new(),
                values: vec![EnumValue {
                    name: "RED".into(),
                    value: 0,
                }],
            })
        };
        let win = platform("x86_64-pc-windows-msvc");
        let mut merged = enum_on("x86_64-unknown-linux-gnu", "unsigned int");
        assert!(merged.absorb(&enum_on("x86_64-pc-windows-msvc", "int")));
        let Node::Enum(color) = &merged else { panic!("not an enum") };
        assert_eq!(color.integer_type_on(&win).name, "int");
        assert_eq!(color.integer_type.name, "unsigned int");

        let mut other = enum_on("aarch64-unknown-linux-gnu", "unsigned int");
        if let Node::Enum(e) = &mut other {
            e.values[0].value = 1;
        }
        assert!(!merged.absorb(&other));
    }

    #[test]
    fn attribute_lookup() {
        let meta = NodeMeta::default().with_attribute("kind", "EnumConstant");
        assert_eq!(meta.attribute("kind"), Some("EnumConstant"));
        assert_eq!(meta.attribute("missing"), None);
    }
}

//! Normalized type descriptors.
//!
//! A [`TypeInfo`] names a C type the way a binding generator needs to see it:
//! surface name, normalized kind, pointer depth, array length and qualifiers.
//! Size and alignment are platform-scoped and live in a [`PlatformTable`]; two
//! descriptors that differ only in their layout tables have the same *shape*
//! and can be merged.
//!
//! A typedef is judged by its own name: `int64_t` is one shape whether it
//! aliases `long` or `long long`. When platforms disagree on the aliased
//! type, each platform's target is kept in a per-platform table.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use castffi_targets::TargetPlatform;
use serde::{Deserialize, Serialize};

/// A value recorded separately for each platform it was observed on.
pub type PlatformTable<T> = BTreeMap<TargetPlatform, T>;

/// Size and alignment in bytes on one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeLayout {
    pub size: u64,
    pub align: u64,
}

impl TypeLayout {
    pub fn new(size: u64, align: u64) -> Self {
        Self { size, align }
    }
}

/// Normalized category of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    /// Built-in scalar or `void`.
    Primitive,
    Pointer,
    Array,
    FunctionPointer,
    Record,
    Enum,
    /// A typedef name; `inner` holds the aliased type.
    Alias,
    /// A type known by name only (forward declaration or forced opaque).
    Opaque,
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TypeKind::Primitive => "primitive",
            TypeKind::Pointer => "pointer",
            TypeKind::Array => "array",
            TypeKind::FunctionPointer => "function pointer",
            TypeKind::Record => "record",
            TypeKind::Enum => "enum",
            TypeKind::Alias => "alias",
            TypeKind::Opaque => "opaque",
        };
        f.write_str(s)
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A resolved C type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Surface name, e.g. `int`, `Node*`, `char[16]`, `my_handle_t`.
    pub name: String,
    pub kind: TypeKind,
    /// Per-platform size and alignment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout: PlatformTable<TypeLayout>,
    /// Number of consecutive pointer levels (`char**` is 2).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pointer_depth: u32,
    /// Element count for arrays; `Some(0)` marks a flexible array member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_len: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_const: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_volatile: bool,
    /// Canonical spelling before typedef resolution, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// Pointee, element or aliased type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<TypeInfo>>,
    /// Aliased type per platform, filled only when platforms disagree on it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inner_by_platform: PlatformTable<TypeInfo>,
}

impl TypeInfo {
    /// A descriptor with no layout and no inner type.
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            layout: BTreeMap::new(),
            pointer_depth: 0,
            array_len: None,
            is_const: false,
            is_volatile: false,
            original_name: None,
            inner: None,
            inner_by_platform: BTreeMap::new(),
        }
    }

    pub fn with_layout(mut self, platform: TargetPlatform, layout: TypeLayout) -> Self {
        self.layout.insert(platform, layout);
        self
    }

    pub fn with_inner(mut self, inner: TypeInfo) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Layout on one platform.
    pub fn layout_on(&self, platform: &TargetPlatform) -> Option<TypeLayout> {
        self.layout.get(platform).copied()
    }

    /// Size on one platform.
    pub fn size_on(&self, platform: &TargetPlatform) -> Option<u64> {
        self.layout_on(platform).map(|l| l.size)
    }

    /// Pointee, element or aliased type as seen on one platform.
    pub fn inner_on(&self, platform: &TargetPlatform) -> Option<&TypeInfo> {
        self.inner_by_platform
            .get(platform)
            .or(self.inner.as_deref())
    }

    /// Platforms this descriptor carries any layout for.
    pub fn platforms(&self) -> BTreeSet<TargetPlatform> {
        let mut platforms: BTreeSet<_> = self.layout.keys().cloned().collect();
        platforms.extend(self.inner_by_platform.keys().cloned());
        if platforms.is_empty() {
            if let Some(inner) = &self.inner {
                platforms = inner.platforms();
            }
        }
        platforms
    }

    /// Copy of this descriptor with every layout table cut down to `platform`.
    pub fn restricted_to(&self, platform: &TargetPlatform) -> TypeInfo {
        let mut copy = self.clone();
        copy.layout.retain(|p, _| p == platform);
        copy.inner_by_platform.clear();
        copy.inner = self
            .inner_on(platform)
            .map(|inner| Box::new(inner.restricted_to(platform)));
        copy
    }

    /// Follow aliases down to the first non-alias type.
    pub fn canonical(&self) -> &TypeInfo {
        let mut current = self;
        while current.kind == TypeKind::Alias {
            match &current.inner {
                Some(inner) => current = inner,
                None => break,
            }
        }
        current
    }

    /// Kind after resolving typedef chains.
    pub fn canonical_kind(&self) -> TypeKind {
        self.canonical().kind
    }

    /// Pointee of a pointer, element of an array.
    pub fn element(&self) -> Option<&TypeInfo> {
        match self.kind {
            TypeKind::Pointer | TypeKind::Array => self.inner.as_deref(),
            _ => None,
        }
    }

    /// A name-only forward reference still waiting for its definition.
    pub fn is_stub(&self) -> bool {
        matches!(self.kind, TypeKind::Record | TypeKind::Opaque) && self.layout.is_empty()
    }

    /// Structural equality ignoring layout tables and canonical spellings.
    ///
    /// Aliases compare by surface and canonical kind only; what they resolve
    /// to may vary per platform.
    pub fn same_shape(&self, other: &TypeInfo) -> bool {
        let surface = self.name == other.name
            && self.kind == other.kind
            && self.pointer_depth == other.pointer_depth
            && self.array_len == other.array_len
            && self.is_const == other.is_const
            && self.is_volatile == other.is_volatile;
        if !surface {
            return false;
        }
        if self.kind == TypeKind::Alias {
            return self.canonical_kind() == other.canonical_kind();
        }
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => a.same_shape(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Union `other`'s layout tables into this descriptor, recursively.
    ///
    /// Callers check [`TypeInfo::same_shape`] first; entries already present
    /// for a platform are kept.
    pub fn absorb_layouts(&mut self, other: &TypeInfo) {
        let mine_on = self.platforms();
        for (platform, layout) in &other.layout {
            self.layout.entry(platform.clone()).or_insert(*layout);
        }
        if self.kind == TypeKind::Alias {
            if let (Some(mine), Some(theirs)) = (self.inner.as_deref_mut(), other.inner.as_deref()) {
                absorb_targets(
                    mine,
                    &mut self.inner_by_platform,
                    &mine_on,
                    theirs,
                    &other.inner_by_platform,
                    &other.platforms(),
                );
            }
            return;
        }
        if let (Some(mine), Some(theirs)) = (self.inner.as_deref_mut(), other.inner.as_deref()) {
            mine.absorb_layouts(theirs);
        }
    }

    /// Fill layout tables of stubs named `name` anywhere in this descriptor.
    ///
    /// Aliases left without a layout because their target was a stub take
    /// the target's layout.
    pub fn reconcile_stub(&mut self, name: &str, platform: &TargetPlatform, layout: TypeLayout) {
        if self.name == name && self.is_stub() {
            self.layout.insert(platform.clone(), layout);
        }
        for target in self.inner_by_platform.values_mut() {
            target.reconcile_stub(name, platform, layout);
        }
        if let Some(inner) = self.inner.as_deref_mut() {
            inner.reconcile_stub(name, platform, layout);
        }
        if self.kind == TypeKind::Alias && !self.layout.contains_key(platform) {
            if let Some(resolved) = self.inner_on(platform).and_then(|i| i.layout_on(platform)) {
                self.layout.insert(platform.clone(), resolved);
            }
        }
    }

    /// Whether this descriptor, or anything it points at, is an unfilled stub.
    pub fn contains_stub(&self) -> bool {
        self.is_stub()
            || self.inner.as_deref().is_some_and(TypeInfo::contains_stub)
            || self.inner_by_platform.values().any(TypeInfo::contains_stub)
    }
}

/// Merge a per-platform target (aliased type, enum integer type) seen on
/// `theirs_on` into one seen on `mine_on`.
///
/// While every platform agrees on the target's shape, `table` stays empty and
/// `mine` carries the union of layouts. On the first disagreement `table` is
/// seeded with one entry per platform and keeps one from then on; `mine`
/// remains the target of the first platform merged.
pub fn absorb_targets(
    mine: &mut TypeInfo,
    table: &mut PlatformTable<TypeInfo>,
    mine_on: &BTreeSet<TargetPlatform>,
    theirs: &TypeInfo,
    their_table: &PlatformTable<TypeInfo>,
    theirs_on: &BTreeSet<TargetPlatform>,
) {
    let agree = mine.same_shape(theirs);
    if table.is_empty() && their_table.is_empty() && agree {
        mine.absorb_layouts(theirs);
        return;
    }
    if table.is_empty() {
        for platform in mine_on {
            table.insert(platform.clone(), mine.restricted_to(platform));
        }
    }
    let incoming: PlatformTable<TypeInfo> = if their_table.is_empty() {
        theirs_on
            .iter()
            .map(|p| (p.clone(), theirs.restricted_to(p)))
            .collect()
    } else {
        their_table.clone()
    };
    for (platform, target) in incoming {
        match table.entry(platform) {
            Entry::Vacant(slot) => {
                slot.insert(target);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().same_shape(&target) {
                    slot.get_mut().absorb_layouts(&target);
                }
            }
        }
    }
    if agree {
        mine.absorb_layouts(theirs);
    }
}

//! Cursor and type arena for one parsed translation unit.
//!
//! This is the shape the explorer consumes from a C front end: a flat arena
//! of cursors (declarations, fields, parameters, macros) and a flat arena of
//! types, cross-referencing each other by index. It mirrors what libclang
//! exposes per cursor and per type, and it is also the on-disk format of a
//! cursor dump.
//!
//! Cursor 0 is always the translation unit itself.

use std::collections::HashMap;
use std::fmt;

use castffi_ast::{CallingConvention, Diagnostic, Location, RecordKind, TargetPlatform};
use castffi_targets::{CScalar, PlatformModel};
use serde::{Deserialize, Serialize};

use crate::error::{ExploreError, Result};

/// Index of a cursor in [`TranslationUnit::cursors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorId(pub u32);

/// Index of a type in [`TranslationUnit::types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl CursorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Declaration kinds the explorer dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    TranslationUnit,
    StructDecl,
    UnionDecl,
    EnumDecl,
    EnumConstantDecl,
    FieldDecl,
    FunctionDecl,
    ParmDecl,
    TypedefDecl,
    VarDecl,
    MacroDefinition,
    /// Anything else the front end reports; skipped.
    #[serde(other)]
    Other,
}

impl CursorKind {
    pub fn is_record(self) -> bool {
        matches!(self, CursorKind::StructDecl | CursorKind::UnionDecl)
    }

    pub fn record_kind(self) -> Option<RecordKind> {
        match self {
            CursorKind::StructDecl => Some(RecordKind::Struct),
            CursorKind::UnionDecl => Some(RecordKind::Union),
            _ => None,
        }
    }
}

/// Front-end type kinds, following libclang's `CXTypeKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeTypeKind {
    Void,
    Bool,
    CharS,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Int128,
    UInt128,
    Float,
    Double,
    LongDouble,
    WChar,
    Char16,
    Char32,
    Pointer,
    Record,
    Enum,
    Typedef,
    Elaborated,
    Attributed,
    ConstantArray,
    IncompleteArray,
    FunctionProto,
    FunctionNoProto,
    Unexposed,
    #[serde(other)]
    Invalid,
}

impl NativeTypeKind {
    /// C spelling and layout class of a builtin scalar.
    pub fn scalar(self) -> Option<(&'static str, CScalar)> {
        let pair = match self {
            NativeTypeKind::Bool => ("bool", CScalar::Bool),
            NativeTypeKind::CharS => ("char", CScalar::Char),
            NativeTypeKind::SChar => ("signed char", CScalar::Char),
            NativeTypeKind::UChar => ("unsigned char", CScalar::Char),
            NativeTypeKind::Short => ("short", CScalar::Short),
            NativeTypeKind::UShort => ("unsigned short", CScalar::Short),
            NativeTypeKind::Int => ("int", CScalar::Int),
            NativeTypeKind::UInt => ("unsigned int", CScalar::Int),
            NativeTypeKind::Long => ("long", CScalar::Long),
            NativeTypeKind::ULong => ("unsigned long", CScalar::Long),
            NativeTypeKind::LongLong => ("long long", CScalar::LongLong),
            NativeTypeKind::ULongLong => ("unsigned long long", CScalar::LongLong),
            NativeTypeKind::Int128 => ("__int128", CScalar::Int128),
            NativeTypeKind::UInt128 => ("unsigned __int128", CScalar::Int128),
            NativeTypeKind::Float => ("float", CScalar::Float),
            NativeTypeKind::Double => ("double", CScalar::Double),
            NativeTypeKind::LongDouble => ("long double", CScalar::LongDouble),
            NativeTypeKind::WChar => ("wchar_t", CScalar::WChar),
            NativeTypeKind::Char16 => ("char16_t", CScalar::Char16),
            NativeTypeKind::Char32 => ("char32_t", CScalar::Char32),
            _ => return None,
        };
        Some(pair)
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// One cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorData {
    pub kind: CursorKind,
    #[serde(default)]
    pub spelling: String,
    #[serde(default)]
    pub location: Location,
    /// `clang_getCursorType`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<TypeId>,
    /// Typedef underlying type, or enum integer type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<TypeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CursorId>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_definition: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_anonymous: bool,
    /// `extern` storage on a variable.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_extern: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_function_like: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_value: Option<i64>,
    /// Field offset in bits, when the front end computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_bits: Option<u64>,
    /// Macro replacement tokens (the macro name excluded).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
}

impl CursorData {
    pub fn new(kind: CursorKind, spelling: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            spelling: spelling.into(),
            location,
            type_id: None,
            underlying: None,
            children: Vec::new(),
            is_definition: false,
            is_anonymous: false,
            is_extern: false,
            is_function_like: false,
            enum_value: None,
            offset_bits: None,
            tokens: Vec::new(),
        }
    }
}

/// One type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeData {
    pub kind: NativeTypeKind,
    #[serde(default)]
    pub spelling: String,
    /// `clang_Type_getSizeOf`, absent when the front end could not say.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_const: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_volatile: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointee: Option<TypeId>,
    /// Array element type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<TypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_len: Option<u64>,
    /// Declaring cursor of a record, enum or typedef type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<CursorId>,
    /// Named type behind an elaborated or attributed type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named: Option<TypeId>,
    /// Function result type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TypeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeId>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_variadic: bool,
    #[serde(default)]
    pub calling_convention: CallingConvention,
}

impl TypeData {
    pub fn new(kind: NativeTypeKind, spelling: impl Into<String>) -> Self {
        Self {
            kind,
            spelling: spelling.into(),
            size: None,
            align: None,
            is_const: false,
            is_volatile: false,
            pointee: None,
            element: None,
            array_len: None,
            declaration: None,
            named: None,
            result: None,
            params: Vec::new(),
            is_variadic: false,
            calling_convention: CallingConvention::Cdecl,
        }
    }

    pub fn with_layout(mut self, size: u64, align: u64) -> Self {
        self.size = Some(size);
        self.align = Some(align);
        self
    }

    /// Front-end layout, when both size and alignment are known.
    pub fn layout(&self) -> Option<(u64, u64)> {
        self.size.zip(self.align)
    }
}

/// A parsed translation unit for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Path of the parsed header.
    pub file: String,
    pub cursors: Vec<CursorData>,
    #[serde(default)]
    pub types: Vec<TypeData>,
    /// Diagnostics reported by the front end while parsing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl TranslationUnit {
    pub const ROOT: CursorId = CursorId(0);

    /// An empty unit holding only its root cursor.
    pub fn new(file: impl Into<String>) -> Self {
        let file = file.into();
        let root = CursorData::new(
            CursorKind::TranslationUnit,
            file.clone(),
            Location::new(file.clone(), 0, 0),
        );
        Self {
            file,
            cursors: vec![root],
            types: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Parse a cursor dump.
    pub fn from_json(text: &str) -> Result<Self> {
        let unit: TranslationUnit = serde_json::from_str(text)?;
        unit.validate()?;
        Ok(unit)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn root(&self) -> &CursorData {
        self.cursor(Self::ROOT)
    }

    /// Cursor by id. Ids are bounds-checked by [`TranslationUnit::validate`].
    pub fn cursor(&self, id: CursorId) -> &CursorData {
        &self.cursors[id.index()]
    }

    /// Type by id. Ids are bounds-checked by [`TranslationUnit::validate`].
    pub fn ty(&self, id: TypeId) -> &TypeData {
        &self.types[id.index()]
    }

    /// Children of a cursor, in source order.
    pub fn children(&self, id: CursorId) -> impl Iterator<Item = (CursorId, &CursorData)> + '_ {
        self.cursor(id)
            .children
            .iter()
            .map(move |child| (*child, self.cursor(*child)))
    }

    /// Check that every reference points inside the arenas and that cursors
    /// form a tree rooted at cursor 0.
    pub fn validate(&self) -> Result<()> {
        let cursor_count = self.cursors.len();
        let type_count = self.types.len();
        let bad = |what: String| Err(ExploreError::InvalidUnit(what));

        match self.cursors.first() {
            Some(root) if root.kind == CursorKind::TranslationUnit => {}
            _ => return bad("cursor 0 is not a translation unit".to_string()),
        }

        let check_type = |owner: String, id: Option<TypeId>| -> Result<()> {
            match id {
                Some(t) if t.index() >= type_count => {
                    Err(ExploreError::InvalidUnit(format!("{owner} refers to missing type {t}")))
                }
                _ => Ok(()),
            }
        };

        let mut has_parent = vec![false; cursor_count];
        for (index, cursor) in self.cursors.iter().enumerate() {
            let owner = format!("cursor c{index}");
            check_type(owner.clone(), cursor.type_id)?;
            check_type(owner.clone(), cursor.underlying)?;
            for child in &cursor.children {
                if child.index() >= cursor_count {
                    return bad(format!("{owner} has missing child {child}"));
                }
                if *child == Self::ROOT || has_parent[child.index()] {
                    return bad(format!("{owner} re-parents cursor {child}"));
                }
                has_parent[child.index()] = true;
            }
        }

        for (index, ty) in self.types.iter().enumerate() {
            let owner = format!("type t{index}");
            for id in [ty.pointee, ty.element, ty.named, ty.result] {
                check_type(owner.clone(), id)?;
            }
            for id in &ty.params {
                check_type(owner.clone(), Some(*id))?;
            }
            if let Some(decl) = ty.declaration {
                if decl.index() >= cursor_count {
                    return bad(format!("{owner} declared by missing cursor {decl}"));
                }
            }
        }
        Ok(())
    }
}

/// Builds a [`TranslationUnit`] programmatically.
///
/// Scalar and pointer types get their layout from the platform model, the
/// way a real front end reports them. Record types are left without a
/// layout unless one is set explicitly, so the explorer computes it.
#[derive(Debug)]
pub struct TranslationUnitBuilder {
    unit: TranslationUnit,
    model: PlatformModel,
    records: HashMap<String, TypeId>,
}

impl TranslationUnitBuilder {
    pub fn new(file: impl Into<String>, platform: &TargetPlatform) -> Result<Self> {
        Ok(Self {
            unit: TranslationUnit::new(file),
            model: PlatformModel::for_platform(platform)?,
            records: HashMap::new(),
        })
    }

    pub fn root(&self) -> CursorId {
        TranslationUnit::ROOT
    }

    /// A location in the unit's own file.
    pub fn at(&self, line: u32) -> Location {
        Location::new(self.unit.file.clone(), line, 1)
    }

    fn push_type(&mut self, data: TypeData) -> TypeId {
        self.unit.types.push(data);
        TypeId(self.unit.types.len() as u32 - 1)
    }

    fn push_cursor(&mut self, parent: CursorId, data: CursorData) -> CursorId {
        self.unit.cursors.push(data);
        let id = CursorId(self.unit.cursors.len() as u32 - 1);
        self.unit.cursors[parent.index()].children.push(id);
        id
    }

    fn type_mut(&mut self, id: TypeId) -> &mut TypeData {
        &mut self.unit.types[id.index()]
    }

    fn cursor_mut(&mut self, id: CursorId) -> &mut CursorData {
        &mut self.unit.cursors[id.index()]
    }

    pub fn void(&mut self) -> TypeId {
        self.push_type(TypeData::new(NativeTypeKind::Void, "void"))
    }

    /// A builtin scalar type.
    pub fn scalar(&mut self, kind: NativeTypeKind) -> TypeId {
        let data = match kind.scalar() {
            Some((spelling, scalar)) => {
                let layout = self.model.scalar(scalar);
                TypeData::new(kind, spelling).with_layout(layout.size, layout.align)
            }
            None => TypeData::new(kind, ""),
        };
        self.push_type(data)
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        let spelling = format!("{} *", self.unit.ty(pointee).spelling);
        let layout = self.model.scalar(CScalar::Pointer);
        let mut data =
            TypeData::new(NativeTypeKind::Pointer, spelling).with_layout(layout.size, layout.align);
        data.pointee = Some(pointee);
        self.push_type(data)
    }

    /// A copy of `ty` with qualifiers added.
    pub fn qualified(&mut self, ty: TypeId, is_const: bool, is_volatile: bool) -> TypeId {
        let mut data = self.unit.ty(ty).clone();
        data.is_const |= is_const;
        data.is_volatile |= is_volatile;
        self.push_type(data)
    }

    /// An elaborated reference such as `struct Node` to a named type.
    pub fn elaborated(&mut self, named: TypeId) -> TypeId {
        let source = self.unit.ty(named);
        let mut data = TypeData::new(NativeTypeKind::Elaborated, source.spelling.clone());
        data.size = source.size;
        data.align = source.align;
        data.named = Some(named);
        self.push_type(data)
    }

    /// A constant-size array, or an incomplete array when `len` is `None`.
    pub fn array(&mut self, element: TypeId, len: Option<u64>) -> TypeId {
        let source = self.unit.ty(element);
        let (kind, spelling) = match len {
            Some(n) => (NativeTypeKind::ConstantArray, format!("{}[{n}]", source.spelling)),
            None => (NativeTypeKind::IncompleteArray, format!("{}[]", source.spelling)),
        };
        let mut data = TypeData::new(kind, spelling);
        if let (Some(n), Some((size, align))) = (len, source.layout()) {
            data = data.with_layout(size * n, align);
        }
        data.element = Some(element);
        data.array_len = len;
        self.push_type(data)
    }

    pub fn function_type(&mut self, result: TypeId, params: &[TypeId], is_variadic: bool) -> TypeId {
        let mut data = TypeData::new(NativeTypeKind::FunctionProto, "");
        data.result = Some(result);
        data.params = params.to_vec();
        data.is_variadic = is_variadic;
        self.push_type(data)
    }

    pub fn set_layout(&mut self, ty: TypeId, size: u64, align: u64) {
        let data = self.type_mut(ty);
        data.size = Some(size);
        data.align = Some(align);
    }

    pub fn set_calling_convention(&mut self, ty: TypeId, convention: CallingConvention) {
        self.type_mut(ty).calling_convention = convention;
    }

    fn record_cursor(
        &mut self,
        parent: CursorId,
        kind: RecordKind,
        name: &str,
        location: Location,
        is_definition: bool,
    ) -> (CursorId, TypeId) {
        let cursor_kind = match kind {
            RecordKind::Struct => CursorKind::StructDecl,
            RecordKind::Union => CursorKind::UnionDecl,
        };
        let mut data = CursorData::new(cursor_kind, name, location.clone());
        data.is_definition = is_definition;
        data.is_anonymous = name.is_empty();
        let cursor = self.push_cursor(parent, data);

        let ty = match self.records.get(name).copied().filter(|_| !name.is_empty()) {
            Some(existing) => existing,
            None => {
                let spelling = if name.is_empty() {
                    format!("{kind} (anonymous at {location})")
                } else {
                    format!("{kind} {name}")
                };
                let mut data = TypeData::new(NativeTypeKind::Record, spelling);
                data.declaration = Some(cursor);
                let ty = self.push_type(data);
                if !name.is_empty() {
                    self.records.insert(name.to_string(), ty);
                }
                ty
            }
        };
        if is_definition {
            self.type_mut(ty).declaration = Some(cursor);
        }
        self.cursor_mut(cursor).type_id = Some(ty);
        (cursor, ty)
    }

    /// A struct or union definition. An empty name makes it anonymous.
    pub fn record(
        &mut self,
        parent: CursorId,
        kind: RecordKind,
        name: &str,
        location: Location,
    ) -> (CursorId, TypeId) {
        self.record_cursor(parent, kind, name, location, true)
    }

    /// A forward declaration such as `struct handle;`.
    pub fn declare_record(
        &mut self,
        parent: CursorId,
        kind: RecordKind,
        name: &str,
        location: Location,
    ) -> (CursorId, TypeId) {
        self.record_cursor(parent, kind, name, location, false)
    }

    pub fn field(&mut self, record: CursorId, name: &str, ty: TypeId, location: Location) -> CursorId {
        let mut data = CursorData::new(CursorKind::FieldDecl, name, location);
        data.type_id = Some(ty);
        self.push_cursor(record, data)
    }

    pub fn set_field_offset(&mut self, field: CursorId, offset_bits: u64) {
        self.cursor_mut(field).offset_bits = Some(offset_bits);
    }

    /// An enum definition with the given integer type.
    pub fn enumeration(
        &mut self,
        parent: CursorId,
        name: &str,
        integer: TypeId,
        location: Location,
    ) -> (CursorId, TypeId) {
        let mut data = CursorData::new(CursorKind::EnumDecl, name, location.clone());
        data.is_definition = true;
        data.is_anonymous = name.is_empty();
        data.underlying = Some(integer);
        let cursor = self.push_cursor(parent, data);

        let spelling = if name.is_empty() {
            format!("enum (anonymous at {location})")
        } else {
            format!("enum {name}")
        };
        let mut ty = TypeData::new(NativeTypeKind::Enum, spelling);
        if let Some((size, align)) = self.unit.ty(integer).layout() {
            ty = ty.with_layout(size, align);
        }
        ty.declaration = Some(cursor);
        let ty = self.push_type(ty);
        self.cursor_mut(cursor).type_id = Some(ty);
        (cursor, ty)
    }

    pub fn enum_constant(&mut self, decl: CursorId, name: &str, value: i64, location: Location) -> CursorId {
        let mut data = CursorData::new(CursorKind::EnumConstantDecl, name, location);
        data.enum_value = Some(value);
        data.type_id = self.unit.cursor(decl).type_id;
        self.push_cursor(decl, data)
    }

    pub fn typedef(
        &mut self,
        parent: CursorId,
        name: &str,
        underlying: TypeId,
        location: Location,
    ) -> (CursorId, TypeId) {
        let mut data = CursorData::new(CursorKind::TypedefDecl, name, location);
        data.is_definition = true;
        data.underlying = Some(underlying);
        let cursor = self.push_cursor(parent, data);

        let mut ty = TypeData::new(NativeTypeKind::Typedef, name);
        if let Some((size, align)) = self.unit.ty(underlying).layout() {
            ty = ty.with_layout(size, align);
        }
        ty.declaration = Some(cursor);
        let ty = self.push_type(ty);
        self.cursor_mut(cursor).type_id = Some(ty);
        (cursor, ty)
    }

    /// A function declaration with named parameters.
    pub fn function(
        &mut self,
        parent: CursorId,
        name: &str,
        result: TypeId,
        params: &[(&str, TypeId)],
        location: Location,
    ) -> (CursorId, TypeId) {
        let param_types: Vec<TypeId> = params.iter().map(|(_, t)| *t).collect();
        let ty = self.function_type(result, &param_types, false);
        let mut data = CursorData::new(CursorKind::FunctionDecl, name, location.clone());
        data.type_id = Some(ty);
        let cursor = self.push_cursor(parent, data);
        for (param, param_ty) in params {
            let mut data = CursorData::new(CursorKind::ParmDecl, *param, location.clone());
            data.type_id = Some(*param_ty);
            self.push_cursor(cursor, data);
        }
        (cursor, ty)
    }

    pub fn set_variadic(&mut self, function_type: TypeId) {
        self.type_mut(function_type).is_variadic = true;
    }

    pub fn variable(
        &mut self,
        parent: CursorId,
        name: &str,
        ty: TypeId,
        is_extern: bool,
        location: Location,
    ) -> CursorId {
        let mut data = CursorData::new(CursorKind::VarDecl, name, location);
        data.type_id = Some(ty);
        data.is_extern = is_extern;
        self.push_cursor(parent, data)
    }

    /// An object-like macro.
    pub fn macro_definition(&mut self, name: &str, tokens: &[&str], location: Location) -> CursorId {
        let mut data = CursorData::new(CursorKind::MacroDefinition, name, location);
        data.tokens = tokens.iter().map(|t| t.to_string()).collect();
        self.push_cursor(TranslationUnit::ROOT, data)
    }

    pub fn function_like_macro(&mut self, name: &str, tokens: &[&str], location: Location) -> CursorId {
        let id = self.macro_definition(name, tokens, location);
        self.cursor_mut(id).is_function_like = true;
        id
    }

    /// Record a front-end diagnostic.
    pub fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.unit.diagnostics.push(diagnostic);
    }

    pub fn finish(self) -> TranslationUnit {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x64() -> TargetPlatform {
        TargetPlatform::parse("x86_64-unknown-linux-gnu").unwrap()
    }

    #[test]
    fn builder_produces_valid_unit() {
        let mut b = TranslationUnitBuilder::new("list.h", &x64()).unwrap();
        let root = b.root();
        let (node, node_ty) = b.record(root, RecordKind::Struct, "Node", b.at(1));
        let next = b.pointer(node_ty);
        b.field(node, "next", next, b.at(2));
        let unit = b.finish();

        unit.validate().unwrap();
        assert_eq!(unit.root().children.len(), 1);
        assert_eq!(unit.ty(next).size, Some(8));
        assert_eq!(unit.ty(node_ty).declaration, Some(node));
    }

    #[test]
    fn definition_after_forward_declaration_shares_type() {
        let mut b = TranslationUnitBuilder::new("h.h", &x64()).unwrap();
        let root = b.root();
        let (_, fwd_ty) = b.declare_record(root, RecordKind::Struct, "S", b.at(1));
        let (def, def_ty) = b.record(root, RecordKind::Struct, "S", b.at(2));
        let unit = b.finish();
        assert_eq!(fwd_ty, def_ty);
        assert_eq!(unit.ty(def_ty).declaration, Some(def));
    }

    #[test]
    fn validate_rejects_dangling_type() {
        let mut unit = TranslationUnit::new("h.h");
        let mut cursor = CursorData::new(CursorKind::VarDecl, "v", Location::default());
        cursor.type_id = Some(TypeId(7));
        unit.cursors.push(cursor);
        unit.cursors[0].children.push(CursorId(1));
        assert!(matches!(unit.validate(), Err(ExploreError::InvalidUnit(_))));
    }

    #[test]
    fn validate_rejects_shared_children() {
        let mut unit = TranslationUnit::new("h.h");
        unit.cursors.push(CursorData::new(CursorKind::StructDecl, "A", Location::default()));
        unit.cursors.push(CursorData::new(CursorKind::FieldDecl, "x", Location::default()));
        unit.cursors[0].children = vec![CursorId(1), CursorId(2)];
        unit.cursors[1].children = vec![CursorId(2)];
        assert!(unit.validate().is_err());
    }

    #[test]
    fn dump_round_trips() {
        let mut b = TranslationUnitBuilder::new("h.h", &x64()).unwrap();
        let int = b.scalar(NativeTypeKind::Int);
        let root = b.root();
        b.variable(root, "counter", int, true, b.at(3));
        b.macro_definition("MAX", &["16"], b.at(4));
        let unit = b.finish();
        let text = unit.to_json().unwrap();
        assert_eq!(TranslationUnit::from_json(&text).unwrap(), unit);
    }

    #[test]
    fn unknown_kinds_degrade() {
        let text = r#"{
            "file": "h.h",
            "cursors": [
                { "kind": "translation_unit", "children": [1] },
                { "kind": "static_assert" }
            ],
            "types": [ { "kind": "vector" } ]
        }"#;
        let unit = TranslationUnit::from_json(text).unwrap();
        assert_eq!(unit.cursor(CursorId(1)).kind, CursorKind::Other);
        assert_eq!(unit.ty(TypeId(0)).kind, NativeTypeKind::Invalid);
    }
}

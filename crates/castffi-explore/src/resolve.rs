//! Type resolution.
//!
//! Turns front-end type handles into [`TypeInfo`] descriptors for one
//! platform. Layout comes from the front end when it reports one and is
//! otherwise derived: scalars and pointers from the [`PlatformModel`], arrays
//! from their element, records by laying out their fields.
//!
//! Self- and mutually-referential records are handled by tracking which
//! record definitions are being laid out. A reference to one of them yields a
//! name-only stub, and every stub is filled in once the record's layout is
//! known.

use std::collections::HashMap;

use castffi_ast::{
    CallingConvention, Diagnostic, FunctionParameter, FunctionPointer, Location, NodeMeta, RecordKind, TargetPlatform,
    TypeInfo, TypeKind, TypeLayout,
};
use castffi_targets::{CScalar, PlatformModel};

use crate::cursor::{CursorId, CursorKind, NativeTypeKind, TranslationUnit, TypeData, TypeId};
use crate::filter::FilterPolicy;

/// Outcome of a resolution step; the error is always a Fatal diagnostic.
pub type Resolved<T> = std::result::Result<T, Diagnostic>;

/// One laid-out field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub cursor: CursorId,
    pub name: String,
    pub type_info: TypeInfo,
    /// Byte offset from the start of the record.
    pub offset: u64,
}

/// A record definition with its fields laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub type_info: TypeInfo,
    pub fields: Vec<FieldLayout>,
}

fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// `unsigned int*` becomes `UnsignedIntPtr`.
fn pascal_case(type_name: &str) -> String {
    let spaced = type_name
        .replace('*', " Ptr ")
        .replace('[', " Array ");
    spaced
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Name fragment for a type; qualifiers count only below a pointer, where
/// they change the type. `const char*` is `ConstCharPtr`, `char* const*` is
/// `CharPtrConstPtr`.
fn type_token(info: &TypeInfo) -> String {
    match (info.kind, info.inner.as_deref()) {
        (TypeKind::Pointer, Some(pointee)) => pointee_token(pointee) + "Ptr",
        _ => pascal_case(&info.name),
    }
}

fn pointee_token(info: &TypeInfo) -> String {
    let qualifiers = match (info.is_const, info.is_volatile) {
        (true, true) => "ConstVolatile",
        (true, false) => "Const",
        (false, true) => "Volatile",
        (false, false) => "",
    };
    if info.kind == TypeKind::Pointer {
        type_token(info) + qualifiers
    } else {
        qualifiers.to_string() + &type_token(info)
    }
}

/// Name for a function pointer type nobody named: `FnPtr_<params>_<return>`,
/// with the calling convention after `FnPtr` when it is not cdecl.
fn function_pointer_name(
    convention: CallingConvention,
    return_type: &TypeInfo,
    parameters: &[FunctionParameter],
) -> String {
    let mut name = String::from(match convention {
        CallingConvention::Cdecl => "FnPtr",
        CallingConvention::StdCall => "FnPtrStdCall",
        CallingConvention::FastCall => "FnPtrFastCall",
        CallingConvention::VectorCall => "FnPtrVectorCall",
    });
    for param in parameters {
        name.push('_');
        name.push_str(&type_token(&param.type_info));
    }
    name.push('_');
    name.push_str(&type_token(return_type));
    name
}

fn is_void(info: &TypeInfo) -> bool {
    let canonical = info.canonical();
    canonical.kind == TypeKind::Primitive && canonical.name == "void"
}

/// Resolves types of one translation unit for one platform.
pub struct TypeResolver<'a> {
    unit: &'a TranslationUnit,
    model: &'a PlatformModel,
    policy: &'a FilterPolicy,
    /// Names given to anonymous declarations.
    names: HashMap<CursorId, String>,
    cache: HashMap<TypeId, TypeInfo>,
    /// Types being resolved, tagged with how many records were being laid
    /// out when they started.
    active: Vec<(TypeId, usize)>,
    laying_out: Vec<CursorId>,
    records: HashMap<CursorId, RecordLayout>,
    lifted: Vec<FunctionPointer>,
    /// First function pointer lifted under each name.
    lifted_names: HashMap<String, FunctionPointer>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(unit: &'a TranslationUnit, model: &'a PlatformModel, policy: &'a FilterPolicy) -> Self {
        Self {
            unit,
            model,
            policy,
            names: HashMap::new(),
            cache: HashMap::new(),
            active: Vec::new(),
            laying_out: Vec::new(),
            records: HashMap::new(),
            lifted: Vec::new(),
            lifted_names: HashMap::new(),
        }
    }

    pub fn platform(&self) -> &'a TargetPlatform {
        &self.model.platform
    }

    /// Name an anonymous declaration. Must happen before its type is resolved.
    pub fn set_name(&mut self, cursor: CursorId, name: impl Into<String>) {
        self.names.insert(cursor, name.into());
    }

    pub fn has_name(&self, cursor: CursorId) -> bool {
        self.names.contains_key(&cursor)
    }

    /// Effective name of a declaration: an assigned name, its spelling, or
    /// failing both the spelling of its type.
    pub fn declaration_name(&self, cursor: CursorId) -> String {
        if let Some(name) = self.names.get(&cursor) {
            return name.clone();
        }
        let data = self.unit.cursor(cursor);
        if !data.spelling.is_empty() {
            return data.spelling.clone();
        }
        data.type_id
            .map(|t| self.unit.ty(t).spelling.clone())
            .unwrap_or_default()
    }

    /// Function pointer nodes discovered so far, in discovery order.
    pub fn take_lifted(&mut self) -> Vec<FunctionPointer> {
        std::mem::take(&mut self.lifted)
    }

    fn fatal(&self, message: impl Into<String>, location: &Location) -> Diagnostic {
        Diagnostic::fatal(message)
            .with_location(location.clone())
            .with_platform(self.platform().clone())
    }

    fn pointer_layout(&self) -> TypeLayout {
        let pointer = self.model.scalar(CScalar::Pointer);
        TypeLayout::new(pointer.size, pointer.align)
    }

    fn front_end_layout(data: &TypeData) -> Option<TypeLayout> {
        data.layout().map(|(size, align)| TypeLayout::new(size, align))
    }

    fn with_layout(&self, info: TypeInfo, layout: Option<TypeLayout>) -> TypeInfo {
        match layout {
            Some(layout) => info.with_layout(self.platform().clone(), layout),
            None => info,
        }
    }

    /// A builtin scalar described by name.
    pub fn scalar(&self, name: &str, scalar: CScalar) -> TypeInfo {
        let layout = self.model.scalar(scalar);
        TypeInfo::new(name, TypeKind::Primitive)
            .with_layout(self.platform().clone(), TypeLayout::new(layout.size, layout.align))
    }

    /// `char*`, the type of a string literal.
    pub fn char_pointer(&self) -> TypeInfo {
        let mut info = TypeInfo::new("char*", TypeKind::Pointer)
            .with_layout(self.platform().clone(), self.pointer_layout())
            .with_inner(self.scalar("char", CScalar::Char));
        info.pointer_depth = 1;
        info
    }

    /// Skip elaborated and attributed sugar.
    pub fn peel(&self, mut ty: TypeId) -> TypeId {
        for _ in 0..=self.unit.types.len() {
            let data = self.unit.ty(ty);
            match (data.kind, data.named) {
                (NativeTypeKind::Elaborated | NativeTypeKind::Attributed, Some(named)) => ty = named,
                _ => break,
            }
        }
        ty
    }

    /// The function prototype `ty` names, looking through sugar and typedefs.
    fn function_behind(&self, mut ty: TypeId) -> Option<TypeId> {
        for _ in 0..=self.unit.types.len() {
            let data = self.unit.ty(ty);
            match data.kind {
                NativeTypeKind::FunctionProto | NativeTypeKind::FunctionNoProto => return Some(ty),
                NativeTypeKind::Elaborated
                | NativeTypeKind::Attributed
                | NativeTypeKind::Unexposed => ty = data.named?,
                NativeTypeKind::Typedef => {
                    ty = self.unit.cursor(data.declaration?).underlying?;
                }
                _ => return None,
            }
        }
        None
    }

    /// The prototype behind a pointer-to-function type, if `ty` is one.
    pub fn function_behind_pointer(&self, ty: TypeId) -> Option<TypeId> {
        let data = self.unit.ty(self.peel(ty));
        match (data.kind, data.pointee) {
            (NativeTypeKind::Pointer, Some(pointee)) => self.function_behind(pointee),
            _ => None,
        }
    }

    /// Resolve a type without requiring a size (pointees, typedef targets,
    /// extern variables of incomplete type).
    pub fn resolve(&mut self, ty: TypeId, location: &Location) -> Resolved<TypeInfo> {
        if let Some(hit) = self.cache.get(&ty) {
            return Ok(hit.clone());
        }
        let generation = self.laying_out.len();
        if self.active.contains(&(ty, generation)) {
            let spelling = &self.unit.ty(ty).spelling;
            return Err(self.fatal(format!("type '{spelling}' refers to itself"), location));
        }

        self.active.push((ty, generation));
        let result = self.resolve_uncached(ty, location);
        self.active.pop();

        let mut info = result?;
        let data = self.unit.ty(ty);
        info.is_const |= data.is_const;
        info.is_volatile |= data.is_volatile;
        if matches!(info.kind, TypeKind::Record | TypeKind::Enum | TypeKind::Alias)
            && self.policy.is_opaque(&info.name)
        {
            info.kind = TypeKind::Opaque;
            info.inner = None;
            info.original_name = None;
        }
        self.cache.insert(ty, info.clone());
        Ok(info)
    }

    /// Resolve a type used by value: it must have a size on this platform.
    pub fn resolve_value(&mut self, ty: TypeId, location: &Location) -> Resolved<TypeInfo> {
        let info = self.resolve(ty, location)?;
        if info.layout_on(self.platform()).is_none() {
            return Err(self.fatal(
                format!("type '{}' has no determinable size", info.name),
                location,
            ));
        }
        Ok(info)
    }

    /// Resolve a function result: `void` or a sized type.
    pub fn resolve_return(&mut self, ty: TypeId, location: &Location) -> Resolved<TypeInfo> {
        let info = self.resolve(ty, location)?;
        if is_void(&info) {
            return Ok(info);
        }
        self.resolve_value(ty, location)
    }

    fn resolve_uncached(&mut self, ty: TypeId, location: &Location) -> Resolved<TypeInfo> {
        let unit = self.unit;
        let data = unit.ty(ty);
        if let Some((name, scalar)) = data.kind.scalar() {
            let layout = Self::front_end_layout(data).unwrap_or_else(|| {
                let l = self.model.scalar(scalar);
                TypeLayout::new(l.size, l.align)
            });
            return Ok(self.with_layout(TypeInfo::new(name, TypeKind::Primitive), Some(layout)));
        }

        match data.kind {
            NativeTypeKind::Void => Ok(TypeInfo::new("void", TypeKind::Primitive)),
            NativeTypeKind::Pointer => self.pointer_type(data, location),
            NativeTypeKind::ConstantArray | NativeTypeKind::IncompleteArray => {
                self.array_type(data, location)
            }
            NativeTypeKind::Record => self.record_type(data, location),
            NativeTypeKind::Enum => self.enum_type(data, location),
            NativeTypeKind::Typedef => self.typedef_type(data, location),
            NativeTypeKind::FunctionProto | NativeTypeKind::FunctionNoProto => {
                self.function_pointer(None, ty, location)
            }
            NativeTypeKind::Elaborated | NativeTypeKind::Attributed | NativeTypeKind::Unexposed => {
                match data.named {
                    Some(named) => self.resolve(named, location),
                    None => Err(self.fatal(
                        format!("cannot see through type '{}'", data.spelling),
                        location,
                    )),
                }
            }
            _ => Err(self.fatal(
                format!("unsupported type '{}' ({:?})", data.spelling, data.kind),
                location,
            )),
        }
    }

    fn pointer_type(&mut self, data: &TypeData, location: &Location) -> Resolved<TypeInfo> {
        let Some(pointee) = data.pointee else {
            return Err(self.fatal(format!("pointer '{}' has no pointee", data.spelling), location));
        };
        if let Some(proto) = self.function_behind(pointee) {
            return self.function_pointer(None, proto, location);
        }
        let inner = self.resolve(pointee, location)?;
        let depth = if inner.kind == TypeKind::Pointer {
            inner.pointer_depth + 1
        } else {
            1
        };
        let layout = Self::front_end_layout(data).unwrap_or_else(|| self.pointer_layout());
        let mut info = self
            .with_layout(TypeInfo::new(format!("{}*", inner.name), TypeKind::Pointer), Some(layout))
            .with_inner(inner);
        info.pointer_depth = depth;
        Ok(info)
    }

    fn array_type(&mut self, data: &TypeData, location: &Location) -> Resolved<TypeInfo> {
        let Some(element) = data.element else {
            return Err(self.fatal(format!("array '{}' has no element type", data.spelling), location));
        };
        let element = self.resolve_value(element, location)?;
        let element_layout = element.layout_on(self.platform());
        let (name, len) = match (data.kind, data.array_len) {
            (NativeTypeKind::ConstantArray, Some(n)) if n > 0 => (format!("{}[{n}]", element.name), n),
            // Flexible array members and `[0]` are zero-length markers.
            _ => (format!("{}[]", element.name), 0),
        };
        let layout = Self::front_end_layout(data).or_else(|| {
            element_layout.map(|l| TypeLayout::new(l.size * len, l.align))
        });
        let mut info = self
            .with_layout(TypeInfo::new(name, TypeKind::Array), layout)
            .with_inner(element);
        info.array_len = Some(len);
        Ok(info)
    }

    fn record_type(&mut self, data: &TypeData, location: &Location) -> Resolved<TypeInfo> {
        let Some(decl) = data.declaration else {
            return Err(self.fatal(
                format!("record '{}' has no declaration", data.spelling),
                location,
            ));
        };
        let name = self.declaration_name(decl);
        if !self.unit.cursor(decl).is_definition {
            // Declared but never defined: usable behind a pointer only.
            return Ok(TypeInfo::new(name, TypeKind::Opaque));
        }
        if let Some(layout) = Self::front_end_layout(data) {
            return Ok(self.with_layout(TypeInfo::new(name, TypeKind::Record), Some(layout)));
        }
        if self.laying_out.contains(&decl) {
            return Ok(TypeInfo::new(name, TypeKind::Record));
        }
        Ok(self.record_layout(decl)?.type_info)
    }

    fn enum_type(&mut self, data: &TypeData, location: &Location) -> Resolved<TypeInfo> {
        let Some(decl) = data.declaration else {
            return Err(self.fatal(format!("enum '{}' has no declaration", data.spelling), location));
        };
        let name = self.declaration_name(decl);
        let layout = match Self::front_end_layout(data) {
            Some(layout) => layout,
            None => {
                let integer = self.enum_integer(decl, location)?;
                integer
                    .layout_on(self.platform())
                    .unwrap_or_else(|| {
                        let l = self.model.enum_default;
                        TypeLayout::new(l.size, l.align)
                    })
            }
        };
        Ok(self.with_layout(TypeInfo::new(name, TypeKind::Enum), Some(layout)))
    }

    /// Integer type of an enum declaration, `int` when the front end omits it.
    pub fn enum_integer(&mut self, decl: CursorId, location: &Location) -> Resolved<TypeInfo> {
        match self.unit.cursor(decl).underlying {
            Some(integer) => self.resolve_value(integer, location),
            None => Ok(self.scalar("int", CScalar::Int)),
        }
    }

    fn typedef_type(&mut self, data: &TypeData, location: &Location) -> Resolved<TypeInfo> {
        let unit = self.unit;
        let Some(decl) = data.declaration else {
            return Err(self.fatal(format!("typedef '{}' has no declaration", data.spelling), location));
        };
        let cursor = unit.cursor(decl);
        let name = cursor.spelling.clone();
        let Some(underlying) = cursor.underlying else {
            return Err(self.fatal(format!("typedef '{name}' has no underlying type"), &cursor.location));
        };

        if let Some(proto) = self.function_behind_pointer(underlying) {
            if self.policy.is_opaque(&name) {
                let layout = self.pointer_layout();
                return Ok(self.with_layout(TypeInfo::new(name, TypeKind::Opaque), Some(layout)));
            }
            return self.function_pointer(Some(name), proto, &cursor.location);
        }

        let inner = self.resolve(underlying, &cursor.location)?;
        if matches!(inner.kind, TypeKind::Record | TypeKind::Enum | TypeKind::Opaque)
            && inner.name == name
        {
            // `typedef struct X X;`
            return Ok(inner);
        }
        let layout = Self::front_end_layout(data).or_else(|| inner.layout_on(self.platform()));
        let canonical = inner.canonical().name.clone();
        let mut alias = self.with_layout(TypeInfo::new(name, TypeKind::Alias), layout);
        if canonical != alias.name {
            alias.original_name = Some(canonical);
        }
        Ok(alias.with_inner(inner))
    }

    fn function_pointer(
        &mut self,
        name: Option<String>,
        proto: TypeId,
        location: &Location,
    ) -> Resolved<TypeInfo> {
        let unit = self.unit;
        let data = unit.ty(proto);
        let return_type = match data.result {
            Some(result) => self.resolve_return(result, location)?,
            None => TypeInfo::new("void", TypeKind::Primitive),
        };
        let mut parameters = Vec::with_capacity(data.params.len());
        for param in &data.params {
            parameters.push(FunctionParameter {
                name: String::new(),
                type_info: self.resolve_value(*param, location)?,
            });
        }
        let name = name.unwrap_or_else(|| {
            function_pointer_name(data.calling_convention, &return_type, &parameters)
        });
        let mut info = TypeInfo::new(name.clone(), TypeKind::FunctionPointer)
            .with_layout(self.platform().clone(), self.pointer_layout());
        info.pointer_depth = 1;

        let lifted = FunctionPointer {
            meta: NodeMeta::new(name.clone(), location.clone(), self.platform().clone()),
            type_info: info.clone(),
            calling_convention: data.calling_convention,
            return_type,
            parameters,
        };
        let differs = self
            .lifted_names
            .get(&name)
            .map(|first| !first.same_shape(&lifted));
        match differs {
            None => {
                tracing::trace!(name = %name, "lifted function pointer");
                self.lifted_names.insert(name, lifted.clone());
                self.lifted.push(lifted);
            }
            // Handed on so the collision is reported when the node is emitted.
            Some(true) => self.lifted.push(lifted),
            Some(false) => {}
        }
        Ok(info)
    }

    /// Lay out a record definition's fields.
    ///
    /// Offsets come from the front end when present; otherwise struct fields
    /// are placed at the next naturally aligned offset and union fields at 0.
    /// The record size is rounded up to its largest field alignment.
    pub fn record_layout(&mut self, decl: CursorId) -> Resolved<RecordLayout> {
        if let Some(done) = self.records.get(&decl) {
            return Ok(done.clone());
        }
        let unit = self.unit;
        let cursor = unit.cursor(decl);
        let name = self.declaration_name(decl);
        let record_kind = cursor.kind.record_kind().unwrap_or(RecordKind::Struct);
        let kind = if self.policy.is_opaque(&name) {
            TypeKind::Opaque
        } else {
            TypeKind::Record
        };

        self.laying_out.push(decl);
        let result = self.lay_out_fields(decl, record_kind);
        self.laying_out.pop();
        let (fields, computed) = result?;

        let layout = cursor
            .type_id
            .and_then(|t| Self::front_end_layout(unit.ty(t)))
            .unwrap_or(computed);
        let mut record = RecordLayout {
            type_info: TypeInfo::new(name.clone(), kind).with_layout(self.platform().clone(), layout),
            fields,
        };
        self.fill_stubs(&name, layout, &mut record);
        self.records.insert(decl, record.clone());
        Ok(record)
    }

    fn lay_out_fields(
        &mut self,
        decl: CursorId,
        record_kind: RecordKind,
    ) -> Resolved<(Vec<FieldLayout>, TypeLayout)> {
        let unit = self.unit;
        let mut fields = Vec::new();
        let mut end = 0;
        let mut align = 1;
        for (id, child) in unit.children(decl) {
            if child.kind != CursorKind::FieldDecl {
                continue;
            }
            let Some(ty) = child.type_id else {
                return Err(self.fatal(format!("field '{}' has no type", child.spelling), &child.location));
            };
            let type_info = self.resolve_value(ty, &child.location)?;
            let field = type_info
                .layout_on(self.platform())
                .unwrap_or(TypeLayout::new(0, 1));
            let offset = match (child.offset_bits, record_kind) {
                (Some(bits), _) => bits / 8,
                (None, RecordKind::Union) => 0,
                (None, RecordKind::Struct) => align_up(end, field.align),
            };
            end = end.max(offset + field.size);
            align = align.max(field.align);
            fields.push(FieldLayout {
                cursor: id,
                name: child.spelling.clone(),
                type_info,
                offset,
            });
        }
        Ok((fields, TypeLayout::new(align_up(end, align), align)))
    }

    /// Give every stub of the just-completed record `name` its layout.
    fn fill_stubs(&mut self, name: &str, layout: TypeLayout, current: &mut RecordLayout) {
        let platform = self.model.platform.clone();
        for field in &mut current.fields {
            field.type_info.reconcile_stub(name, &platform, layout);
        }
        for info in self.cache.values_mut() {
            info.reconcile_stub(name, &platform, layout);
        }
        for record in self.records.values_mut() {
            for field in &mut record.fields {
                field.type_info.reconcile_stub(name, &platform, layout);
            }
        }
        for lifted in &mut self.lifted {
            lifted.return_type.reconcile_stub(name, &platform, layout);
            for param in &mut lifted.parameters {
                param.type_info.reconcile_stub(name, &platform, layout);
            }
        }
    }
}

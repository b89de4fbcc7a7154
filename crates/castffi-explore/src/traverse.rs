//! Single-platform traversal.
//!
//! Walks one translation unit in source order, filters every declaration
//! before resolving it, and produces a partial tree for one platform along
//! with the diagnostics gathered on the way.

use std::collections::{BTreeMap, HashMap, HashSet};

use castffi_ast::{
    AbstractSyntaxTree, Assembler, Diagnostic, Enum, EnumValue, Function, FunctionParameter,
    Location, MacroObject, Node, NodeCategory, NodeMeta, OpaqueType, Record, RecordField,
    RecordKind, TargetPlatform, TypeAlias, TypeInfo, TypeKind, Variable,
};
use castffi_targets::{CScalar, PlatformModel};
use tracing::{debug, trace};

use crate::cursor::{CursorData, CursorId, CursorKind, NativeTypeKind, TranslationUnit};
use crate::filter::{Decision, FilterPolicy};
use crate::resolve::{Resolved, TypeResolver};

/// Result of exploring one platform.
#[derive(Debug, Clone)]
pub struct PlatformExtraction {
    pub platform: TargetPlatform,
    /// `None` when the platform failed.
    pub tree: Option<AbstractSyntaxTree>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlatformExtraction {
    pub fn succeeded(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }
}

/// Explore one translation unit for the platform described by `model`.
#[tracing::instrument(level = "debug", skip_all, fields(platform = %model.platform, file = %unit.file))]
pub fn explore(unit: &TranslationUnit, policy: &FilterPolicy, model: &PlatformModel) -> PlatformExtraction {
    let platform = model.platform.clone();
    let mut diagnostics: Vec<Diagnostic> = unit
        .diagnostics
        .iter()
        .cloned()
        .map(|mut d| {
            d.platform.get_or_insert_with(|| platform.clone());
            d
        })
        .collect();

    if diagnostics.iter().any(Diagnostic::is_error_or_worse) {
        debug!("front end reported errors; platform skipped");
        return PlatformExtraction {
            platform,
            tree: None,
            diagnostics,
        };
    }

    let mut visitor = Visitor::new(unit, policy, model);
    let outcome = visitor.run();
    diagnostics.append(&mut visitor.diagnostics);

    let tree = match outcome.and_then(|()| visitor.assemble()) {
        Ok(tree) => Some(tree),
        Err(fatal) => {
            diagnostics.push(fatal);
            None
        }
    };
    if let Some(tree) = &tree {
        debug!(nodes = tree.node_count(), "platform explored");
    }
    PlatformExtraction {
        platform,
        tree,
        diagnostics,
    }
}

/// Value, unsignedness, number of `l` suffixes and whether the literal is decimal.
fn integer_literal(token: &str) -> Option<(u64, bool, usize, bool)> {
    let lower = token.to_ascii_lowercase();
    let digits = lower.trim_end_matches(['u', 'l']);
    let suffix = &lower[digits.len()..];
    let longs = suffix.matches('l').count();
    let unsigned = suffix.contains('u');
    if suffix.matches('u').count() > 1 || longs > 2 || suffix.contains("lul") {
        return None;
    }
    let (radix, body) = if let Some(hex) = digits.strip_prefix("0x") {
        (16, hex)
    } else if let Some(bin) = digits.strip_prefix("0b") {
        (2, bin)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    let value = u64::from_str_radix(body, radix).ok()?;
    Some((value, unsigned, longs, radix == 10))
}

fn is_float_literal(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if lower.starts_with("0x") {
        return lower.contains('p');
    }
    lower.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && (lower.contains('.') || lower.contains('e'))
}

fn fits(value: u64, bytes: u64, signed: bool) -> bool {
    let bits = (bytes * 8).min(64) as u32;
    let max = if signed {
        (1u128 << (bits - 1)) - 1
    } else {
        (1u128 << bits) - 1
    };
    u128::from(value) <= max
}

struct Visitor<'a> {
    unit: &'a TranslationUnit,
    policy: &'a FilterPolicy,
    model: &'a PlatformModel,
    resolver: TypeResolver<'a>,
    /// Names of every record with a definition in the unit.
    defined: HashSet<String>,
    nodes: Vec<Node>,
    index: HashMap<(NodeCategory, String), usize>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Visitor<'a> {
    fn new(unit: &'a TranslationUnit, policy: &'a FilterPolicy, model: &'a PlatformModel) -> Self {
        Self {
            unit,
            policy,
            model,
            resolver: TypeResolver::new(unit, model, policy),
            defined: HashSet::new(),
            nodes: Vec::new(),
            index: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn platform(&self) -> &'a TargetPlatform {
        &self.model.platform
    }

    fn meta(&self, name: impl Into<String>, location: &Location) -> NodeMeta {
        NodeMeta::new(name, location.clone(), self.platform().clone())
    }

    fn note(&mut self, diagnostic: Diagnostic, location: &Location) {
        let diagnostic = diagnostic
            .with_location(location.clone())
            .with_platform(self.platform().clone());
        self.diagnostics.push(diagnostic);
    }

    fn fatal(&self, message: impl Into<String>, location: &Location) -> Diagnostic {
        Diagnostic::fatal(message)
            .with_location(location.clone())
            .with_platform(self.platform().clone())
    }

    fn run(&mut self) -> Resolved<()> {
        self.name_anonymous();
        let unit = self.unit;
        for (id, cursor) in unit.children(TranslationUnit::ROOT) {
            match cursor.kind {
                CursorKind::StructDecl | CursorKind::UnionDecl => self.visit_record(id)?,
                CursorKind::EnumDecl => self.visit_enum(id)?,
                CursorKind::FunctionDecl => self.visit_function(id)?,
                CursorKind::TypedefDecl => self.visit_typedef(id)?,
                CursorKind::VarDecl => self.visit_variable(id)?,
                CursorKind::MacroDefinition => self.visit_macro(cursor),
                _ => {}
            }
        }
        for lifted in self.resolver.take_lifted() {
            if self.policy.is_ignored(&lifted.meta.name) {
                continue;
            }
            self.emit(Node::FunctionPointer(lifted));
        }
        Ok(())
    }

    /// Give anonymous records and enums the names they are known by:
    /// the typedef that introduces them, or a name derived from the
    /// enclosing record for nested aggregates.
    fn name_anonymous(&mut self) {
        let unit = self.unit;
        for (_, cursor) in unit.children(TranslationUnit::ROOT) {
            if cursor.kind != CursorKind::TypedefDecl {
                continue;
            }
            let Some(underlying) = cursor.underlying else {
                continue;
            };
            let target = unit.ty(self.resolver.peel(underlying));
            if !matches!(target.kind, NativeTypeKind::Record | NativeTypeKind::Enum) {
                continue;
            }
            if let Some(decl) = target.declaration {
                let data = unit.cursor(decl);
                if data.is_anonymous && !self.resolver.has_name(decl) {
                    self.resolver.set_name(decl, cursor.spelling.clone());
                    if data.is_definition {
                        self.defined.insert(cursor.spelling.clone());
                    }
                }
            }
        }
        for (id, cursor) in unit.children(TranslationUnit::ROOT) {
            if cursor.kind.is_record() {
                self.name_nested(id);
            }
        }
    }

    fn name_nested(&mut self, record: CursorId) {
        let unit = self.unit;
        let cursor = unit.cursor(record);
        if cursor.is_definition && !cursor.is_anonymous {
            self.defined.insert(cursor.spelling.clone());
        }
        let parent = self.resolver.declaration_name(record);
        let mut anonymous = 0;
        for (id, child) in unit.children(record) {
            if !child.kind.is_record() {
                continue;
            }
            if child.is_anonymous && !self.resolver.has_name(id) {
                let field = unit.children(record).find(|(_, f)| {
                    f.kind == CursorKind::FieldDecl
                        && f.type_id
                            .map(|t| unit.ty(self.resolver.peel(t)).declaration == Some(id))
                            .unwrap_or(false)
                });
                let name = match field {
                    Some((_, f)) if !f.spelling.is_empty() => format!("{parent}_{}", f.spelling),
                    _ => {
                        anonymous += 1;
                        format!("{parent}_Anonymous{anonymous}")
                    }
                };
                self.resolver.set_name(id, name);
            }
            self.name_nested(id);
        }
    }

    /// Add a node, folding repeated declarations of the same entity.
    fn emit(&mut self, node: Node) {
        let key = (node.category(), node.name().to_string());
        match self.index.get(&key) {
            Some(&existing) => {
                if !self.nodes[existing].absorb(&node) {
                    let location = node.meta().location.clone();
                    self.note(
                        Diagnostic::warning(format!(
                            "conflicting declarations of {} '{}'; keeping the first",
                            key.0, key.1
                        )),
                        &location,
                    );
                }
            }
            None => {
                trace!(category = %key.0, name = %key.1, "emitted node");
                self.index.insert(key, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    fn visit_record(&mut self, id: CursorId) -> Resolved<()> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        if cursor.is_anonymous && !self.resolver.has_name(id) {
            // Anonymous records without a typedef are only reachable through
            // the declarations that use them.
            return Ok(());
        }
        let name = self.resolver.declaration_name(id);
        let decision = self.policy.decide(&cursor.location, &name);
        if decision == Decision::Exclude {
            trace!(name = %name, "record excluded");
            return Ok(());
        }

        if !cursor.is_definition {
            if !self.defined.contains(&name) {
                self.emit(Node::OpaqueType(OpaqueType {
                    meta: self.meta(name.clone(), &cursor.location),
                    type_info: TypeInfo::new(name, TypeKind::Opaque),
                }));
            }
            return Ok(());
        }

        if decision == Decision::IncludeAsOpaque {
            return self.emit_opaque(cursor, name);
        }
        let record = self.build_record(id, name)?;
        self.emit(Node::Record(record));
        Ok(())
    }

    fn emit_opaque(&mut self, cursor: &CursorData, name: String) -> Resolved<()> {
        let Some(ty) = cursor.type_id else {
            return Err(self.fatal(format!("'{name}' has no type"), &cursor.location));
        };
        let mut type_info = self.resolver.resolve_value(ty, &cursor.location)?;
        type_info.kind = TypeKind::Opaque;
        type_info.inner = None;
        type_info.original_name = None;
        self.emit(Node::OpaqueType(OpaqueType {
            meta: self.meta(name, &cursor.location),
            type_info,
        }));
        Ok(())
    }

    fn build_record(&mut self, id: CursorId, name: String) -> Resolved<Record> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        let layout = self.resolver.record_layout(id)?;

        let mut nested = BTreeMap::new();
        for (child_id, child) in unit.children(id) {
            if !child.kind.is_record() || !child.is_definition {
                continue;
            }
            if child.is_anonymous {
                let child_name = self.resolver.declaration_name(child_id);
                let record = self.build_record(child_id, child_name.clone())?;
                nested.insert(child_name, record);
            } else {
                // C gives tag declarations inside a record file scope.
                self.visit_record(child_id)?;
            }
        }

        let platform = self.platform();
        let fields = layout
            .fields
            .into_iter()
            .map(|field| RecordField {
                name: field.name,
                type_info: field.type_info,
                offset: BTreeMap::from([(platform.clone(), field.offset)]),
            })
            .collect();
        Ok(Record {
            meta: self.meta(name, &cursor.location),
            record_kind: cursor.kind.record_kind().unwrap_or(RecordKind::Struct),
            type_info: layout.type_info,
            fields,
            nested,
        })
    }

    fn visit_enum(&mut self, id: CursorId) -> Resolved<()> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        let anonymous = cursor.is_anonymous && !self.resolver.has_name(id);
        let name = self.resolver.declaration_name(id);
        if !anonymous {
            match self.policy.decide(&cursor.location, &name) {
                Decision::Exclude => return Ok(()),
                Decision::IncludeAsOpaque => return self.emit_opaque(cursor, name),
                Decision::Include => {}
            }
        }

        let integer_type = self.resolver.enum_integer(id, &cursor.location)?;
        let mut values = Vec::new();
        let mut next = 0i64;
        for (_, constant) in unit.children(id) {
            if constant.kind != CursorKind::EnumConstantDecl {
                continue;
            }
            let value = constant.enum_value.unwrap_or(next);
            next = value.wrapping_add(1);
            if anonymous {
                if self.policy.decide(&constant.location, &constant.spelling) != Decision::Include {
                    continue;
                }
                let meta = self
                    .meta(constant.spelling.clone(), &constant.location)
                    .with_attribute("kind", "EnumConstant");
                self.emit(Node::MacroObject(MacroObject {
                    meta,
                    value: value.to_string(),
                    type_info: integer_type.clone(),
                }));
            } else {
                values.push(EnumValue {
                    name: constant.spelling.clone(),
                    value,
                });
            }
        }
        if anonymous {
            return Ok(());
        }

        if values.is_empty() {
            self.note(Diagnostic::warning(format!("enum '{name}' has no values")), &cursor.location);
        }
        self.emit(Node::Enum(Enum {
            meta: self.meta(name, &cursor.location),
            integer_type,
            integer_type_by_platform: BTreeMap::new(),
            values,
        }));
        Ok(())
    }

    fn visit_function(&mut self, id: CursorId) -> Resolved<()> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        let name = cursor.spelling.clone();
        if self.policy.decide(&cursor.location, &name) == Decision::Exclude {
            return Ok(());
        }
        let proto = cursor.type_id.map(|t| unit.ty(self.resolver.peel(t)));
        let Some(proto) = proto.filter(|p| {
            matches!(p.kind, NativeTypeKind::FunctionProto | NativeTypeKind::FunctionNoProto)
        }) else {
            return Err(self.fatal(format!("function '{name}' has no function type"), &cursor.location));
        };

        let return_type = match proto.result {
            Some(result) => self.resolver.resolve_return(result, &cursor.location)?,
            None => TypeInfo::new("void", TypeKind::Primitive),
        };
        let mut parameters = Vec::new();
        for (_, param) in unit.children(id) {
            if param.kind != CursorKind::ParmDecl {
                continue;
            }
            let Some(ty) = param.type_id else {
                return Err(self.fatal(
                    format!("parameter '{}' of '{name}' has no type", param.spelling),
                    &param.location,
                ));
            };
            parameters.push(FunctionParameter {
                name: param.spelling.clone(),
                type_info: self.resolver.resolve_value(ty, &param.location)?,
            });
        }

        self.emit(Node::Function(Function {
            meta: self.meta(name, &cursor.location),
            calling_convention: proto.calling_convention,
            return_type,
            parameters,
            is_variadic: proto.is_variadic,
        }));
        Ok(())
    }

    fn visit_typedef(&mut self, id: CursorId) -> Resolved<()> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        let name = cursor.spelling.clone();
        let decision = self.policy.decide(&cursor.location, &name);
        if decision == Decision::Exclude {
            return Ok(());
        }
        let Some(ty) = cursor.type_id else {
            return Err(self.fatal(format!("typedef '{name}' has no type"), &cursor.location));
        };
        let info = self.resolver.resolve(ty, &cursor.location)?;
        match info.kind {
            // Lifted by the resolver.
            TypeKind::FunctionPointer => Ok(()),
            TypeKind::Alias => {
                let underlying = info.inner.map(|inner| *inner).unwrap_or_else(|| {
                    TypeInfo::new(info.original_name.unwrap_or_default(), TypeKind::Primitive)
                });
                self.emit(Node::TypeAlias(TypeAlias {
                    meta: self.meta(name, &cursor.location),
                    underlying,
                    underlying_by_platform: BTreeMap::new(),
                }));
                Ok(())
            }
            TypeKind::Opaque if info.name == name && decision == Decision::IncludeAsOpaque => {
                self.emit(Node::OpaqueType(OpaqueType {
                    meta: self.meta(name, &cursor.location),
                    type_info: info,
                }));
                Ok(())
            }
            // Folded into the record or enum of the same name.
            _ => Ok(()),
        }
    }

    fn visit_variable(&mut self, id: CursorId) -> Resolved<()> {
        let unit = self.unit;
        let cursor = unit.cursor(id);
        if !cursor.is_extern {
            return Ok(());
        }
        let name = cursor.spelling.clone();
        if self.policy.decide(&cursor.location, &name) == Decision::Exclude {
            return Ok(());
        }
        let Some(ty) = cursor.type_id else {
            return Err(self.fatal(format!("variable '{name}' has no type"), &cursor.location));
        };
        let type_info = self.resolver.resolve(ty, &cursor.location)?;
        self.emit(Node::Variable(Variable {
            meta: self.meta(name, &cursor.location),
            type_info,
        }));
        Ok(())
    }

    fn visit_macro(&mut self, cursor: &CursorData) {
        let name = &cursor.spelling;
        if self.policy.decide(&cursor.location, name) == Decision::Exclude {
            return;
        }
        if cursor.is_function_like {
            self.note(
                Diagnostic::information(format!("macro '{name}' is function-like; skipped")),
                &cursor.location,
            );
            return;
        }
        let [token] = cursor.tokens.as_slice() else {
            self.note(
                Diagnostic::information(format!(
                    "macro '{name}' does not expand to a single literal; skipped"
                )),
                &cursor.location,
            );
            return;
        };
        match self.literal_type(token) {
            Some(type_info) => self.emit(Node::MacroObject(MacroObject {
                meta: self.meta(name.clone(), &cursor.location),
                value: token.clone(),
                type_info,
            })),
            None => self.note(
                Diagnostic::information(format!("macro '{name}' value '{token}' is not a literal; skipped")),
                &cursor.location,
            ),
        }
    }

    /// C type of a literal token, following the usual suffix and range rules.
    fn literal_type(&self, token: &str) -> Option<TypeInfo> {
        if token.starts_with('"') || token.starts_with("u8\"") {
            return token.ends_with('"').then(|| self.resolver.char_pointer());
        }
        if token.starts_with('\'') {
            return (token.len() >= 3 && token.ends_with('\''))
                .then(|| self.resolver.scalar("char", CScalar::Char));
        }
        if token.starts_with("L'") {
            return token
                .ends_with('\'')
                .then(|| self.resolver.scalar("wchar_t", CScalar::WChar));
        }
        if is_float_literal(token) {
            let lower = token.to_ascii_lowercase();
            let hex = lower.starts_with("0x");
            return if lower.ends_with('f') {
                Some(self.resolver.scalar("float", CScalar::Float))
            } else if lower.ends_with('l') {
                Some(self.resolver.scalar("long double", CScalar::LongDouble))
            } else {
                let body = lower.trim_end_matches(['f', 'l']);
                (hex || body.parse::<f64>().is_ok())
                    .then(|| self.resolver.scalar("double", CScalar::Double))
            };
        }
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let (value, unsigned, longs, decimal) = integer_literal(token)?;
        let ranks = [
            ("int", CScalar::Int),
            ("long", CScalar::Long),
            ("long long", CScalar::LongLong),
        ];
        for (spelling, scalar) in &ranks[longs..] {
            let size = self.model.scalar(*scalar).size;
            if !unsigned && fits(value, size, true) {
                return Some(self.resolver.scalar(spelling, *scalar));
            }
            if (unsigned || !decimal) && fits(value, size, false) {
                return Some(self.resolver.scalar(&format!("unsigned {spelling}"), *scalar));
            }
        }
        None
    }

    fn assemble(&mut self) -> Resolved<AbstractSyntaxTree> {
        let mut assembler =
            Assembler::new(self.unit.file.clone()).platforms([self.platform().clone()]);
        for node in std::mem::take(&mut self.nodes) {
            let location = node.meta().location.clone();
            assembler
                .add_named(node)
                .map_err(|e| self.fatal(e.to_string(), &location))?;
        }
        Ok(assembler.finish())
    }
}

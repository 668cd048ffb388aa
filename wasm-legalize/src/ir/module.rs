//!
//! Module Container
//!
//! A `Module` owns every entity a pass can see: functions (defined or
//! imported), named function types, exports, globals and the indirect-call
//! table. Entities are stored in insertion-ordered maps keyed by `Name`, so
//! iteration order is deterministic and matches the order entities were
//! added. The name is the externally visible identifier; the map slot is the
//! stable internal handle.
//!
//! Invariants checked by `validate`:
//! - every export targets an existing function or global
//! - every table entry names an existing function
//! - every direct call and global access resolves
//! - a function's type reference, when set, matches its signature
//!

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::ModuleError;
use super::expr::Expression;
use super::types::{Literal, Name, Signature, ValType};
use super::visitor::{walk_expr, Visitor};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportLinkage {
    pub module: Name,
    pub base: Name,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    /// Locals beyond the parameters, indexed after them.
    #[serde(default)]
    pub vars: Vec<ValType>,
    pub expr: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Defined(Body),
    Imported(ImportLinkage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: Name,
    pub sig: Signature,
    #[serde(default, rename = "type")]
    pub type_ref: Option<Name>,
    pub kind: FunctionKind,
}

impl Function {
    pub fn defined(name: impl Into<Name>, sig: Signature, vars: Vec<ValType>, expr: Expression) -> Self {
        Self {
            name: name.into(),
            sig,
            type_ref: None,
            kind: FunctionKind::Defined(Body { vars, expr }),
        }
    }

    pub fn imported(
        name: impl Into<Name>,
        sig: Signature,
        module: impl Into<Name>,
        base: impl Into<Name>,
    ) -> Self {
        Self {
            name: name.into(),
            sig,
            type_ref: None,
            kind: FunctionKind::Imported(ImportLinkage {
                module: module.into(),
                base: base.into(),
            }),
        }
    }

    pub fn with_type(mut self, ty: impl Into<Name>) -> Self {
        self.type_ref = Some(ty.into());
        self
    }

    pub fn is_imported(&self) -> bool {
        matches!(self.kind, FunctionKind::Imported(_))
    }

    pub fn import(&self) -> Option<&ImportLinkage> {
        match &self.kind {
            FunctionKind::Imported(linkage) => Some(linkage),
            FunctionKind::Defined(_) => None,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match &self.kind {
            FunctionKind::Defined(body) => Some(body),
            FunctionKind::Imported(_) => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        match &mut self.kind {
            FunctionKind::Defined(body) => Some(body),
            FunctionKind::Imported(_) => None,
        }
    }

    /// Equal in everything but the name.
    pub fn same_shape(&self, other: &Function) -> bool {
        self.sig == other.sig && self.type_ref == other.type_ref && self.kind == other.kind
    }

    /// True if the body contains a direct call to `target`.
    pub fn calls(&self, target: &str) -> bool {
        struct FindCall<'a> {
            target: &'a str,
            found: bool,
        }
        impl Visitor for FindCall<'_> {
            fn visit_expr(&mut self, expr: &Expression) {
                if expr.is_call_to(self.target) {
                    self.found = true;
                }
                walk_expr(self, expr);
            }
        }

        let Some(body) = self.body() else {
            return false;
        };
        let mut finder = FindCall { target, found: false };
        finder.visit_expr(&body.expr);
        finder.found
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionType {
    pub name: Name,
    pub sig: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Function,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: Name,
    pub kind: ExportKind,
    pub value: Name,
}

impl Export {
    pub fn function(name: impl Into<Name>, value: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::Function,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: Name,
    pub ty: ValType,
    pub mutable: bool,
    pub init: Literal,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Segment {
    pub offset: u32,
    pub data: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Table {
    /// Function at table slot `index`, if any segment covers it.
    pub fn get(&self, index: u32) -> Option<&Name> {
        self.segments.iter().rev().find_map(|segment| {
            let slot = index.checked_sub(segment.offset)? as usize;
            segment.data.get(slot)
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &Name> {
        self.segments.iter().flat_map(|segment| segment.data.iter())
    }

    /// Applies a name remapping uniformly to every segment; returns how many entries changed.
    pub fn remap(&mut self, map: &HashMap<Name, Name>) -> usize {
        let mut changed = 0;
        for name in self.segments.iter_mut().flat_map(|segment| segment.data.iter_mut()) {
            if let Some(replacement) = map.get(&*name) {
                *name = replacement.clone();
                changed += 1;
            }
        }
        changed
    }
}

/// Outcome of an idempotent upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub name: Name,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "ModuleRepr", into = "ModuleRepr")]
pub struct Module {
    functions: IndexMap<Name, Function>,
    function_types: IndexMap<Name, FunctionType>,
    exports: IndexMap<Name, Export>,
    globals: IndexMap<Name, Global>,
    pub table: Table,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.values()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.values_mut()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.get_mut(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn add_function(&mut self, func: Function) -> Result<&mut Function, ModuleError> {
        match self.functions.entry(func.name.clone()) {
            indexmap::map::Entry::Occupied(_) => Err(ModuleError::DuplicateFunction(func.name)),
            indexmap::map::Entry::Vacant(slot) => Ok(slot.insert(func)),
        }
    }

    pub fn remove_function(&mut self, name: &str) -> Result<Function, ModuleError> {
        self.functions
            .shift_remove(name)
            .ok_or_else(|| ModuleError::UnknownFunction(Name::new(name)))
    }

    /// Imported function with the given host linkage.
    pub fn imported_function(&self, module: &str, base: &str) -> Option<&Function> {
        self.functions.values().find(|func| {
            func.import()
                .is_some_and(|linkage| linkage.module == module && linkage.base == base)
        })
    }

    pub fn function_types(&self) -> impl Iterator<Item = &FunctionType> {
        self.function_types.values()
    }

    pub fn function_type(&self, name: &str) -> Option<&FunctionType> {
        self.function_types.get(name)
    }

    pub fn add_function_type(&mut self, ty: FunctionType) -> Result<(), ModuleError> {
        if self.function_types.contains_key(&ty.name) {
            return Err(ModuleError::DuplicateFunctionType(ty.name));
        }
        self.function_types.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub fn exports(&self) -> impl Iterator<Item = &Export> {
        self.exports.values()
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }

    pub fn export_mut(&mut self, name: &str) -> Option<&mut Export> {
        self.exports.get_mut(name)
    }

    pub fn add_export(&mut self, export: Export) -> Result<(), ModuleError> {
        if self.exports.contains_key(&export.name) {
            return Err(ModuleError::DuplicateExport(export.name));
        }
        self.exports.insert(export.name.clone(), export);
        Ok(())
    }

    /// A function export with the given external name.
    pub fn function_export(&self, name: &str) -> Option<&Export> {
        self.exports
            .get(name)
            .filter(|export| export.kind == ExportKind::Function)
    }

    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.values()
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.get(name)
    }

    pub fn add_global(&mut self, global: Global) -> Result<(), ModuleError> {
        if self.globals.contains_key(&global.name) {
            return Err(ModuleError::DuplicateGlobal(global.name));
        }
        self.globals.insert(global.name.clone(), global);
        Ok(())
    }

    /// Picks the name a function shaped like `candidate` belongs under: an
    /// existing function of the same shape under `base` (or a
    /// collision-suffixed variant of it), else the first free name.
    /// `created` is set when the picked name is free.
    pub fn locate_function(&self, base: &Name, candidate: &Function) -> Ensured {
        locate(base, |name| self.functions.get(name).map(|f| f.same_shape(candidate)))
    }

    /// Returns the function shaped like `candidate`, inserting it under the
    /// name `locate_function` picks when there is none.
    pub fn ensure_function(&mut self, base: &Name, mut candidate: Function) -> Result<Ensured, ModuleError> {
        let ensured = self.locate_function(base, &candidate);
        if ensured.created {
            candidate.name = ensured.name.clone();
            self.add_function(candidate)?;
        }
        Ok(ensured)
    }

    /// Same as `ensure_function` for named function types; a type matches when
    /// its signature is equal.
    pub fn ensure_function_type(&mut self, base: &Name, sig: &Signature) -> Result<Ensured, ModuleError> {
        let ensured = locate(base, |name| self.function_types.get(name).map(|ty| ty.sig == *sig));
        if ensured.created {
            self.add_function_type(FunctionType {
                name: ensured.name.clone(),
                sig: sig.clone(),
            })?;
        }
        Ok(ensured)
    }

    /// Same as `locate_function` for globals; `matches` decides whether an
    /// existing global can be reused.
    pub fn locate_global(&self, base: &Name, matches: impl Fn(&Global) -> bool) -> Ensured {
        locate(base, |name| self.globals.get(name).map(|g| matches(g)))
    }

    /// Same as `locate_function` for exports; an export already exposing
    /// function `target` is reused.
    pub fn locate_function_export(&self, base: &Name, target: &Name) -> Ensured {
        locate(base, |name| {
            self.exports
                .get(name)
                .map(|e| e.kind == ExportKind::Function && e.value == *target)
        })
    }

    pub fn validate(&self) -> Result<(), ModuleError> {
        for export in self.exports.values() {
            let exists = match export.kind {
                ExportKind::Function => self.functions.contains_key(&export.value),
                ExportKind::Global => self.globals.contains_key(&export.value),
            };
            if !exists {
                return Err(ModuleError::DanglingExport {
                    export: export.name.clone(),
                    kind: match export.kind {
                        ExportKind::Function => "function",
                        ExportKind::Global => "global",
                    },
                    target: export.value.clone(),
                });
            }
        }

        for (segment_index, segment) in self.table.segments.iter().enumerate() {
            for (entry, name) in segment.data.iter().enumerate() {
                if !self.functions.contains_key(name) {
                    return Err(ModuleError::DanglingTableEntry {
                        segment: segment_index,
                        entry,
                        target: name.clone(),
                    });
                }
            }
        }

        for func in self.functions.values() {
            if let Some(ty) = &func.type_ref {
                let declared = self
                    .function_types
                    .get(ty)
                    .ok_or_else(|| ModuleError::UnknownFunctionType(ty.clone()))?;
                if declared.sig != func.sig {
                    return Err(ModuleError::TypeMismatch {
                        function: func.name.clone(),
                        ty: ty.clone(),
                    });
                }
            }
            if let Some(body) = func.body() {
                let mut refs = References::default();
                refs.visit_expr(&body.expr);
                if let Some(target) = refs.calls.into_iter().find(|t| !self.functions.contains_key(t)) {
                    return Err(ModuleError::DanglingCall {
                        function: func.name.clone(),
                        target,
                    });
                }
                if let Some(global) = refs.globals.into_iter().find(|g| !self.globals.contains_key(g)) {
                    return Err(ModuleError::DanglingGlobal {
                        function: func.name.clone(),
                        global,
                    });
                }
            }
        }
        Ok(())
    }
}

/// First of `base`, `base$1`, `base$2`, ... that is free (`occupant` returns
/// `None`) or holds a matching entity (`Some(true)`).
fn locate(base: &Name, occupant: impl Fn(&Name) -> Option<bool>) -> Ensured {
    for name in name_candidates(base) {
        match occupant(&name) {
            Some(true) => return Ensured { name, created: false },
            Some(false) => continue,
            None => return Ensured { name, created: true },
        }
    }
    unreachable!("name candidates are unbounded")
}

/// `base`, `base$1`, `base$2`, ...
fn name_candidates(base: &Name) -> impl Iterator<Item = Name> + '_ {
    std::iter::once(base.clone()).chain((1u32..).map(move |n| Name::new(format!("{}${}", base, n))))
}

#[derive(Default)]
struct References {
    calls: Vec<Name>,
    globals: Vec<Name>,
}

impl Visitor for References {
    fn visit_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Call { target, .. } => self.calls.push(target.clone()),
            Expression::GlobalGet { name, .. } | Expression::GlobalSet { name, .. } => {
                self.globals.push(name.clone())
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

/// Flat, list-based form used for serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModuleRepr {
    #[serde(default)]
    types: Vec<FunctionType>,
    #[serde(default)]
    functions: Vec<Function>,
    #[serde(default)]
    globals: Vec<Global>,
    #[serde(default)]
    exports: Vec<Export>,
    #[serde(default)]
    table: Table,
}

impl TryFrom<ModuleRepr> for Module {
    type Error = ModuleError;

    fn try_from(repr: ModuleRepr) -> Result<Self, Self::Error> {
        let mut module = Module::new();
        for ty in repr.types {
            module.add_function_type(ty)?;
        }
        for func in repr.functions {
            module.add_function(func)?;
        }
        for global in repr.globals {
            module.add_global(global)?;
        }
        for export in repr.exports {
            module.add_export(export)?;
        }
        module.table = repr.table;
        Ok(module)
    }
}

impl From<Module> for ModuleRepr {
    fn from(module: Module) -> Self {
        Self {
            types: module.function_types.into_values().collect(),
            functions: module.functions.into_values().collect(),
            globals: module.globals.into_values().collect(),
            exports: module.exports.into_values().collect(),
            table: module.table,
        }
    }
}

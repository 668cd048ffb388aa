//!
//! Tree-Walking Evaluator
//!
//! Executes module functions directly from the IR. It exists so the effect
//! of a pass can be observed by running code before and after it: invoke an
//! export with boundary values, compare results bit for bit.
//!
//! - Imports are dispatched to a `Host` (see `HostFunctions` for a closure registry)
//! - Globals live in the `Instance`, initialised from the module; host functions
//!   receive them too, so a host can park a value in a module global
//! - Indirect calls go through the module table and check the callee signature
//! - Float promote/demote preserve NaN payloads, so f32 -> f64 -> f32 is the identity
//!

use std::collections::HashMap;

use thiserror::Error;

use crate::ir::{
    BinaryOp, Expression, FunctionKind, ImportLinkage, Literal, Module, Name, Signature, UnaryOp,
    ValType,
};

const MAX_CALL_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Trap {
    #[error("unknown function '{0}'")]
    UnknownFunction(Name),

    #[error("unknown export '{0}'")]
    UnknownExport(Name),

    #[error("unknown global '{0}'")]
    UnknownGlobal(Name),

    #[error("no host implementation for import \"{module}\" \"{base}\"")]
    MissingImport { module: Name, base: Name },

    #[error("function '{function}' expects {expected}, called with {found} argument(s)")]
    ArgumentMismatch {
        function: Name,
        expected: Signature,
        found: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValType, found: String },

    #[error("local {0} out of range")]
    LocalOutOfRange(u32),

    #[error("table index {0} out of bounds")]
    TableOutOfBounds(u32),

    #[error("indirect call signature mismatch at table index {0}")]
    IndirectSignatureMismatch(u32),

    #[error("call stack exhausted")]
    CallStackExhausted,

    #[error("host error: {0}")]
    Host(String),
}

/// Global values of a running instance.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    values: HashMap<Name, Literal>,
}

impl Globals {
    pub fn from_module(module: &Module) -> Self {
        Self {
            values: module
                .globals()
                .map(|global| (global.name.clone(), global.init))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Literal> {
        self.values.get(name).copied()
    }

    /// Overwrites an existing global; the value must keep its type.
    pub fn set(&mut self, name: &str, value: Literal) -> Result<(), Trap> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| Trap::UnknownGlobal(Name::new(name)))?;
        if slot.ty() != value.ty() {
            return Err(mismatch(slot.ty(), value));
        }
        *slot = value;
        Ok(())
    }
}

pub trait Host {
    fn call_import(
        &mut self,
        linkage: &ImportLinkage,
        args: &[Literal],
        globals: &mut Globals,
    ) -> Result<Option<Literal>, Trap>;
}

type HostFn = Box<dyn FnMut(&[Literal], &mut Globals) -> Result<Option<Literal>, Trap>>;

/// A `Host` backed by closures registered per (module, base).
#[derive(Default)]
pub struct HostFunctions {
    funcs: HashMap<(Name, Name), HostFn>,
}

impl HostFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: &str,
        base: &str,
        mut f: impl FnMut(&[Literal]) -> Result<Option<Literal>, Trap> + 'static,
    ) -> &mut Self {
        self.register_with_globals(module, base, move |args, _| f(args))
    }

    pub fn register_with_globals(
        &mut self,
        module: &str,
        base: &str,
        f: impl FnMut(&[Literal], &mut Globals) -> Result<Option<Literal>, Trap> + 'static,
    ) -> &mut Self {
        self.funcs.insert((Name::new(module), Name::new(base)), Box::new(f));
        self
    }
}

impl Host for HostFunctions {
    fn call_import(
        &mut self,
        linkage: &ImportLinkage,
        args: &[Literal],
        globals: &mut Globals,
    ) -> Result<Option<Literal>, Trap> {
        let f = self
            .funcs
            .get_mut(&(linkage.module.clone(), linkage.base.clone()))
            .ok_or_else(|| Trap::MissingImport {
                module: linkage.module.clone(),
                base: linkage.base.clone(),
            })?;
        f(args, globals)
    }
}

pub struct Instance<'m, H: Host> {
    module: &'m Module,
    host: H,
    globals: Globals,
    depth: usize,
}

impl<'m, H: Host> Instance<'m, H> {
    pub fn new(module: &'m Module, host: H) -> Self {
        Self {
            module,
            host,
            globals: Globals::from_module(module),
            depth: 0,
        }
    }

    pub fn global(&self, name: &str) -> Option<Literal> {
        self.globals.get(name)
    }

    pub fn invoke_export(&mut self, export: &str, args: &[Literal]) -> Result<Option<Literal>, Trap> {
        let target = self
            .module
            .function_export(export)
            .ok_or_else(|| Trap::UnknownExport(Name::new(export)))?
            .value
            .clone();
        self.invoke(&target, args)
    }

    pub fn invoke(&mut self, function: &str, args: &[Literal]) -> Result<Option<Literal>, Trap> {
        let module = self.module;
        let func = module
            .function(function)
            .ok_or_else(|| Trap::UnknownFunction(Name::new(function)))?;

        let arity_ok = args.len() == func.sig.params.len()
            && args.iter().zip(&func.sig.params).all(|(arg, ty)| arg.ty() == *ty);
        if !arity_ok {
            return Err(Trap::ArgumentMismatch {
                function: func.name.clone(),
                expected: func.sig.clone(),
                found: args.len(),
            });
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(Trap::CallStackExhausted);
        }
        self.depth += 1;
        let result = match &func.kind {
            FunctionKind::Imported(linkage) => self.host.call_import(linkage, args, &mut self.globals),
            FunctionKind::Defined(body) => {
                let mut locals: Vec<Literal> = args.to_vec();
                locals.extend(body.vars.iter().map(|ty| Literal::zero(*ty)));
                self.eval(&body.expr, &mut locals)
            }
        };
        self.depth -= 1;

        let result = result?;
        match (func.sig.result, result) {
            (None, _) => Ok(None),
            (Some(expected), Some(value)) if value.ty() == expected => Ok(Some(value)),
            (Some(expected), other) => Err(Trap::TypeMismatch {
                expected,
                found: describe(other),
            }),
        }
    }

    fn value(&mut self, expr: &Expression, locals: &mut Vec<Literal>) -> Result<Literal, Trap> {
        match self.eval(expr, locals)? {
            Some(value) => Ok(value),
            None => Err(Trap::TypeMismatch {
                expected: expr.ty().unwrap_or(ValType::I32),
                found: "none".to_string(),
            }),
        }
    }

    fn eval(&mut self, expr: &Expression, locals: &mut Vec<Literal>) -> Result<Option<Literal>, Trap> {
        match expr {
            Expression::Const(lit) => Ok(Some(*lit)),
            Expression::LocalGet { index, .. } => locals
                .get(*index as usize)
                .copied()
                .map(Some)
                .ok_or(Trap::LocalOutOfRange(*index)),
            Expression::LocalSet { index, value } => {
                let v = self.value(value, locals)?;
                *local_slot(locals, *index)? = v;
                Ok(None)
            }
            Expression::LocalTee { index, value } => {
                let v = self.value(value, locals)?;
                *local_slot(locals, *index)? = v;
                Ok(Some(v))
            }
            Expression::GlobalGet { name, .. } => self
                .globals
                .get(name)
                .map(Some)
                .ok_or_else(|| Trap::UnknownGlobal(name.clone())),
            Expression::GlobalSet { name, value } => {
                let v = self.value(value, locals)?;
                self.globals.set(name, v)?;
                Ok(None)
            }
            Expression::Call { target, operands, .. } => {
                let args = self.operands(operands, locals)?;
                self.invoke(target, &args)
            }
            Expression::CallIndirect { index, operands, sig } => {
                let args = self.operands(operands, locals)?;
                let slot = expect_i32(self.value(index, locals)?)? as u32;
                let module = self.module;
                let target = module.table.get(slot).ok_or(Trap::TableOutOfBounds(slot))?;
                let callee = module
                    .function(target)
                    .ok_or_else(|| Trap::UnknownFunction(target.clone()))?;
                if callee.sig != *sig {
                    return Err(Trap::IndirectSignatureMismatch(slot));
                }
                self.invoke(target, &args)
            }
            Expression::Unary { op, value } => {
                let v = self.value(value, locals)?;
                unary(*op, v).map(Some)
            }
            Expression::Binary { op, left, right } => {
                let l = self.value(left, locals)?;
                let r = self.value(right, locals)?;
                binary(*op, l, r).map(Some)
            }
            Expression::Block { list, ty } => {
                let mut last = None;
                for child in list {
                    last = self.eval(child, locals)?;
                }
                Ok(if ty.is_some() { last } else { None })
            }
            Expression::Drop(value) => {
                self.eval(value, locals)?;
                Ok(None)
            }
            Expression::Nop => Ok(None),
        }
    }

    fn operands(&mut self, operands: &[Expression], locals: &mut Vec<Literal>) -> Result<Vec<Literal>, Trap> {
        operands.iter().map(|op| self.value(op, locals)).collect()
    }
}

fn local_slot(locals: &mut [Literal], index: u32) -> Result<&mut Literal, Trap> {
    locals.get_mut(index as usize).ok_or(Trap::LocalOutOfRange(index))
}

fn describe(value: Option<Literal>) -> String {
    match value {
        Some(v) => v.ty().to_string(),
        None => "none".to_string(),
    }
}

fn mismatch(expected: ValType, found: Literal) -> Trap {
    Trap::TypeMismatch {
        expected,
        found: found.ty().to_string(),
    }
}

fn expect_i32(v: Literal) -> Result<i32, Trap> {
    v.as_i32().ok_or_else(|| mismatch(ValType::I32, v))
}

fn expect_i64(v: Literal) -> Result<i64, Trap> {
    v.as_i64().ok_or_else(|| mismatch(ValType::I64, v))
}

fn expect_f32(v: Literal) -> Result<f32, Trap> {
    v.as_f32().ok_or_else(|| mismatch(ValType::F32, v))
}

fn expect_f64(v: Literal) -> Result<f64, Trap> {
    v.as_f64().ok_or_else(|| mismatch(ValType::F64, v))
}

/// f32 -> f64. Exact for numbers; NaN payloads are shifted into the high mantissa bits.
pub fn promote_f32(bits: u32) -> u64 {
    let v = f32::from_bits(bits);
    if !v.is_nan() {
        return (v as f64).to_bits();
    }
    let sign = u64::from(bits >> 31) << 63;
    let payload = u64::from(bits & 0x007f_ffff) << 29;
    sign | 0x7ff0_0000_0000_0000 | payload
}

/// f64 -> f32, round to nearest even. NaN payloads keep their high mantissa bits.
pub fn demote_f64(bits: u64) -> u32 {
    let v = f64::from_bits(bits);
    if !v.is_nan() {
        return (v as f32).to_bits();
    }
    let sign = ((bits >> 63) as u32) << 31;
    let mut payload = ((bits >> 29) & 0x007f_ffff) as u32;
    if payload == 0 {
        payload = 0x0040_0000;
    }
    sign | 0x7f80_0000 | payload
}

fn unary(op: UnaryOp, v: Literal) -> Result<Literal, Trap> {
    Ok(match op {
        UnaryOp::ExtendUInt32 => Literal::I64(i64::from(expect_i32(v)? as u32)),
        UnaryOp::ExtendSInt32 => Literal::I64(i64::from(expect_i32(v)?)),
        UnaryOp::WrapInt64 => Literal::I32(expect_i64(v)? as i32),
        UnaryOp::DemoteFloat64 => Literal::F32(demote_f64(expect_f64(v)?.to_bits())),
        UnaryOp::PromoteFloat32 => Literal::F64(promote_f32(expect_f32(v)?.to_bits())),
        UnaryOp::SqrtFloat64 => Literal::f64(expect_f64(v)?.sqrt()),
        UnaryOp::NegFloat64 => Literal::f64(-expect_f64(v)?),
    })
}

fn binary(op: BinaryOp, l: Literal, r: Literal) -> Result<Literal, Trap> {
    use BinaryOp::*;
    Ok(match op {
        AddInt32 => Literal::I32(expect_i32(l)?.wrapping_add(expect_i32(r)?)),
        SubInt32 => Literal::I32(expect_i32(l)?.wrapping_sub(expect_i32(r)?)),
        MulInt32 => Literal::I32(expect_i32(l)?.wrapping_mul(expect_i32(r)?)),
        AddInt64 => Literal::I64(expect_i64(l)?.wrapping_add(expect_i64(r)?)),
        SubInt64 => Literal::I64(expect_i64(l)?.wrapping_sub(expect_i64(r)?)),
        MulInt64 => Literal::I64(expect_i64(l)?.wrapping_mul(expect_i64(r)?)),
        AndInt64 => Literal::I64(expect_i64(l)? & expect_i64(r)?),
        OrInt64 => Literal::I64(expect_i64(l)? | expect_i64(r)?),
        XorInt64 => Literal::I64(expect_i64(l)? ^ expect_i64(r)?),
        ShlInt64 => {
            let (l, r) = (expect_i64(l)?, expect_i64(r)?);
            Literal::I64(l.wrapping_shl((r & 63) as u32))
        }
        ShrUInt64 => {
            let (l, r) = (expect_i64(l)?, expect_i64(r)?);
            Literal::I64(((l as u64) >> (r & 63)) as i64)
        }
        ShrSInt64 => {
            let (l, r) = (expect_i64(l)?, expect_i64(r)?);
            Literal::I64(l >> (r & 63))
        }
        AddFloat32 => Literal::f32(expect_f32(l)? + expect_f32(r)?),
        MulFloat32 => Literal::f32(expect_f32(l)? * expect_f32(r)?),
        AddFloat64 => Literal::f64(expect_f64(l)? + expect_f64(r)?),
        SubFloat64 => Literal::f64(expect_f64(l)? - expect_f64(r)?),
        MulFloat64 => Literal::f64(expect_f64(l)? * expect_f64(r)?),
        DivFloat64 => Literal::f64(expect_f64(l)? / expect_f64(r)?),
    })
}

//! Export legalization.
//!
//! The host calls an export, so an illegal export is repointed at a
//! `legalstub$<name>` trampoline that takes host-legal arguments, rebuilds
//! the native values and calls the original function.

use tracing::debug;

use crate::ir::{Builder, ExportKind, Function, Module, ModuleError, Name, Signature, UnaryOp, ValType};
use crate::passes::PassError;

use super::channel::HighWordChannel;
use super::legality::{is_illegal, legalize_signature};

const STUB_PREFIX: &str = "legalstub";

/// Repoints every illegal function export at a legal stub; returns how many
/// exports were repointed.
pub fn legalize_exports(module: &mut Module, channel: &HighWordChannel) -> Result<usize, PassError> {
    let illegal: Vec<(Name, Name)> = module
        .exports()
        .filter(|export| export.kind == ExportKind::Function)
        .filter_map(|export| {
            let target = module.function(&export.value)?;
            is_illegal(&target.sig).then(|| (export.name.clone(), target.name.clone()))
        })
        .collect();

    for (export, target) in &illegal {
        let stub = ensure_export_stub(module, target, channel)?;
        debug!(%export, %target, %stub, "legalized export");
        if let Some(entry) = module.export_mut(export) {
            entry.value = stub;
        }
    }
    Ok(illegal.len())
}

/// The stub for `target`, created on first use; a function may be exported
/// several times and every export shares the one stub.
fn ensure_export_stub(module: &mut Module, target: &Name, channel: &HighWordChannel) -> Result<Name, PassError> {
    let sig = module
        .function(target)
        .map(|f| f.sig.clone())
        .ok_or_else(|| ModuleError::UnknownFunction(target.clone()))?;
    let legal = legalize_signature(&sig);
    let candidate = build_stub(target, &sig, &legal, channel);

    Ok(module.ensure_function(&target.prefixed(STUB_PREFIX), candidate)?.name)
}

fn build_stub(target: &Name, sig: &Signature, legal: &Signature, channel: &HighWordChannel) -> Function {
    let mut operands = Vec::with_capacity(sig.params.len());
    let mut next = 0usize;
    for ty in &sig.params {
        match ty {
            ValType::I64 => {
                operands.push(Builder::recreate_i64_from_locals(next, next + 1));
                next += 2;
            }
            ValType::F32 => {
                operands.push(Builder::unary(
                    UnaryOp::DemoteFloat64,
                    Builder::local_get(next, ValType::F64),
                ));
                next += 1;
            }
            other => {
                operands.push(Builder::local_get(next, *other));
                next += 1;
            }
        }
    }

    let call = Builder::call(target.clone(), operands, sig.result);
    let mut vars = Vec::new();
    let body = match sig.result {
        Some(ValType::I64) => {
            let temp = legal.params.len();
            vars.push(ValType::I64);
            Builder::block(vec![
                Builder::local_set(temp, call),
                channel.write_high(Builder::i64_high(temp)),
                Builder::i64_low(temp),
            ])
        }
        Some(ValType::F32) => Builder::unary(UnaryOp::PromoteFloat32, call),
        _ => call,
    };

    Function::defined(target.prefixed(STUB_PREFIX), legal.clone(), vars, body)
}

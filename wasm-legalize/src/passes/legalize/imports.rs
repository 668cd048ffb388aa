//! Import legalization.
//!
//! Module code calls an import with native types, so an illegal import is
//! replaced by three entities:
//! - `legaltype$<name>`: the host-legal function type
//! - `legalimport$<name>`: the same host linkage under the legal type
//! - `legalfunc$<name>`: a defined function with the original signature that
//!   adapts the arguments and calls `legalimport$<name>`
//!
//! Table entries are remapped to the `legalfunc$` stub and the original
//! imports are removed once every replacement exists.

use std::collections::HashMap;

use tracing::debug;

use crate::ir::{Builder, Function, ImportLinkage, Module, Name, Signature, UnaryOp, ValType};
use crate::passes::PassError;

use super::channel::HighWordChannel;
use super::legality::{is_illegal, legalize_signature};

const TYPE_PREFIX: &str = "legaltype";
const IMPORT_PREFIX: &str = "legalimport";
const STUB_PREFIX: &str = "legalfunc";

/// Replaces every illegal import; returns the original import name to stub
/// name mapping that call sites must follow.
pub fn legalize_imports(
    module: &mut Module,
    channel: &HighWordChannel,
) -> Result<HashMap<Name, Name>, PassError> {
    let illegal: Vec<(Name, Signature, ImportLinkage)> = module
        .functions()
        .filter(|func| is_illegal(&func.sig))
        .filter_map(|func| Some((func.name.clone(), func.sig.clone(), func.import()?.clone())))
        .collect();

    let mut map = HashMap::with_capacity(illegal.len());
    for (name, sig, linkage) in illegal {
        let stub = ensure_import_stub(module, &name, &sig, &linkage, channel)?;
        debug!(import = %name, module = %linkage.module, base = %linkage.base, %stub, "legalized import");
        map.insert(name, stub);
    }
    if map.is_empty() {
        return Ok(map);
    }

    let remapped = module.table.remap(&map);
    if remapped > 0 {
        debug!(entries = remapped, "remapped table entries");
    }
    for name in map.keys() {
        module.remove_function(name)?;
    }
    Ok(map)
}

fn ensure_import_stub(
    module: &mut Module,
    name: &Name,
    sig: &Signature,
    linkage: &ImportLinkage,
    channel: &HighWordChannel,
) -> Result<Name, PassError> {
    let legal = legalize_signature(sig);
    let ty = module
        .ensure_function_type(&name.prefixed(TYPE_PREFIX), &legal)?
        .name;

    let import = Function::imported(
        name.prefixed(IMPORT_PREFIX),
        legal.clone(),
        linkage.module.clone(),
        linkage.base.clone(),
    )
    .with_type(ty);
    let import = module
        .ensure_function(&name.prefixed(IMPORT_PREFIX), import)?
        .name;

    let candidate = build_stub(name.prefixed(STUB_PREFIX), &import, sig, &legal, channel);
    let stub = module
        .ensure_function(&name.prefixed(STUB_PREFIX), candidate)?
        .name;
    Ok(stub)
}

fn build_stub(
    name: Name,
    import: &Name,
    sig: &Signature,
    legal: &Signature,
    channel: &HighWordChannel,
) -> Function {
    let mut operands = Vec::with_capacity(legal.params.len());
    for (index, ty) in sig.params.iter().enumerate() {
        match ty {
            ValType::I64 => {
                operands.push(Builder::i64_low(index));
                operands.push(Builder::i64_high(index));
            }
            ValType::F32 => operands.push(Builder::unary(
                UnaryOp::PromoteFloat32,
                Builder::local_get(index, ValType::F32),
            )),
            other => operands.push(Builder::local_get(index, *other)),
        }
    }

    let call = Builder::call(import.clone(), operands, legal.result);
    let body = match sig.result {
        Some(ValType::I64) => Builder::recreate_i64(call, channel.read_high()),
        Some(ValType::F32) => Builder::unary(UnaryOp::DemoteFloat64, call),
        _ => call,
    };

    Function::defined(name, sig.clone(), vec![], body)
}

//! Host legality of boundary signatures.
//!
//! The host calling convention carries only i32 and f64. An i64 crosses as a
//! (low, high) pair of i32 words, an f32 crosses widened to f64.

use smallvec::smallvec;

use crate::ir::{ParamList, Signature, ValType};

pub fn is_illegal_type(ty: ValType) -> bool {
    matches!(ty, ValType::I64 | ValType::F32)
}

pub fn is_illegal(sig: &Signature) -> bool {
    sig.types().any(is_illegal_type)
}

/// Host-side parameters standing in for one native parameter.
pub fn legal_params(ty: ValType) -> ParamList {
    match ty {
        ValType::I64 => smallvec![ValType::I32, ValType::I32],
        ValType::F32 => smallvec![ValType::F64],
        other => smallvec![other],
    }
}

/// Host-side result. An i64 result shrinks to its low word; the high word
/// travels through the tempRet0 channel.
pub fn legal_result(ty: Option<ValType>) -> Option<ValType> {
    ty.map(|ty| match ty {
        ValType::I64 => ValType::I32,
        ValType::F32 => ValType::F64,
        other => other,
    })
}

pub fn legalize_signature(sig: &Signature) -> Signature {
    Signature {
        params: sig.params.iter().flat_map(|ty| legal_params(*ty)).collect(),
        result: legal_result(sig.result),
    }
}

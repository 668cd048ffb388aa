///
/// Expression Tree
///
/// Function bodies are trees of `Expression` nodes. Only the subset of
/// WebAssembly needed to build and evaluate boundary stubs is modelled:
/// constants, locals, globals, direct and indirect calls, a handful of numeric
/// operators, blocks, drop and nop.
///
/// Every node can report its result type through `Expression::ty`, which
/// relies on the type annotations carried by calls and local/global reads.
///

use serde::{Deserialize, Serialize};

use super::types::{Literal, Name, Signature, ValType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Zero-extends an i32 to i64.
    ExtendUInt32,
    /// Sign-extends an i32 to i64.
    ExtendSInt32,
    /// Truncates an i64 to its low 32 bits.
    WrapInt64,
    /// f64 -> f32, round to nearest even.
    DemoteFloat64,
    /// f32 -> f64, exact.
    PromoteFloat32,
    SqrtFloat64,
    NegFloat64,
}

impl UnaryOp {
    pub fn operand_type(self) -> ValType {
        match self {
            UnaryOp::ExtendUInt32 | UnaryOp::ExtendSInt32 => ValType::I32,
            UnaryOp::WrapInt64 => ValType::I64,
            UnaryOp::DemoteFloat64 | UnaryOp::SqrtFloat64 | UnaryOp::NegFloat64 => ValType::F64,
            UnaryOp::PromoteFloat32 => ValType::F32,
        }
    }

    pub fn result_type(self) -> ValType {
        match self {
            UnaryOp::ExtendUInt32 | UnaryOp::ExtendSInt32 => ValType::I64,
            UnaryOp::WrapInt64 => ValType::I32,
            UnaryOp::DemoteFloat64 => ValType::F32,
            UnaryOp::PromoteFloat32 | UnaryOp::SqrtFloat64 | UnaryOp::NegFloat64 => ValType::F64,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::ExtendUInt32 => "i64.extend_i32_u",
            UnaryOp::ExtendSInt32 => "i64.extend_i32_s",
            UnaryOp::WrapInt64 => "i32.wrap_i64",
            UnaryOp::DemoteFloat64 => "f32.demote_f64",
            UnaryOp::PromoteFloat32 => "f64.promote_f32",
            UnaryOp::SqrtFloat64 => "f64.sqrt",
            UnaryOp::NegFloat64 => "f64.neg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    AddInt32,
    SubInt32,
    MulInt32,
    AddInt64,
    SubInt64,
    MulInt64,
    AndInt64,
    OrInt64,
    XorInt64,
    ShlInt64,
    ShrUInt64,
    ShrSInt64,
    AddFloat32,
    MulFloat32,
    AddFloat64,
    SubFloat64,
    MulFloat64,
    DivFloat64,
}

impl BinaryOp {
    pub fn operand_type(self) -> ValType {
        use BinaryOp::*;
        match self {
            AddInt32 | SubInt32 | MulInt32 => ValType::I32,
            AddInt64 | SubInt64 | MulInt64 | AndInt64 | OrInt64 | XorInt64 | ShlInt64
            | ShrUInt64 | ShrSInt64 => ValType::I64,
            AddFloat32 | MulFloat32 => ValType::F32,
            AddFloat64 | SubFloat64 | MulFloat64 | DivFloat64 => ValType::F64,
        }
    }

    pub fn result_type(self) -> ValType {
        self.operand_type()
    }

    pub fn mnemonic(self) -> &'static str {
        use BinaryOp::*;
        match self {
            AddInt32 => "i32.add",
            SubInt32 => "i32.sub",
            MulInt32 => "i32.mul",
            AddInt64 => "i64.add",
            SubInt64 => "i64.sub",
            MulInt64 => "i64.mul",
            AndInt64 => "i64.and",
            OrInt64 => "i64.or",
            XorInt64 => "i64.xor",
            ShlInt64 => "i64.shl",
            ShrUInt64 => "i64.shr_u",
            ShrSInt64 => "i64.shr_s",
            AddFloat32 => "f32.add",
            MulFloat32 => "f32.mul",
            AddFloat64 => "f64.add",
            SubFloat64 => "f64.sub",
            MulFloat64 => "f64.mul",
            DivFloat64 => "f64.div",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Const(Literal),
    LocalGet {
        index: u32,
        ty: ValType,
    },
    LocalSet {
        index: u32,
        value: Box<Expression>,
    },
    /// Stores into a local and yields the stored value.
    LocalTee {
        index: u32,
        value: Box<Expression>,
    },
    GlobalGet {
        name: Name,
        ty: ValType,
    },
    GlobalSet {
        name: Name,
        value: Box<Expression>,
    },
    Call {
        target: Name,
        #[serde(default)]
        operands: Vec<Expression>,
        #[serde(default)]
        ty: Option<ValType>,
    },
    /// Calls the table entry at `index`, trapping unless it has signature `sig`.
    CallIndirect {
        index: Box<Expression>,
        #[serde(default)]
        operands: Vec<Expression>,
        sig: Signature,
    },
    Unary {
        op: UnaryOp,
        value: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Block {
        #[serde(default)]
        list: Vec<Expression>,
        #[serde(default)]
        ty: Option<ValType>,
    },
    Drop(Box<Expression>),
    #[default]
    Nop,
}

impl Expression {
    /// The type this expression leaves on the stack.
    pub fn ty(&self) -> Option<ValType> {
        match self {
            Expression::Const(lit) => Some(lit.ty()),
            Expression::LocalGet { ty, .. } => Some(*ty),
            Expression::LocalTee { value, .. } => value.ty(),
            Expression::GlobalGet { ty, .. } => Some(*ty),
            Expression::Call { ty, .. } => *ty,
            Expression::CallIndirect { sig, .. } => sig.result,
            Expression::Unary { op, .. } => Some(op.result_type()),
            Expression::Binary { op, .. } => Some(op.result_type()),
            Expression::Block { ty, .. } => *ty,
            Expression::LocalSet { .. }
            | Expression::GlobalSet { .. }
            | Expression::Drop(_)
            | Expression::Nop => None,
        }
    }

    pub fn as_const(&self) -> Option<&Literal> {
        match self {
            Expression::Const(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_call_to(&self, name: &str) -> bool {
        matches!(self, Expression::Call { target, .. } if target.as_str() == name)
    }
}

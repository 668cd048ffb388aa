///
/// Expression Builder
///
/// Small constructors for the expression shapes that passes synthesize, and
/// the i64 helpers used to move 64-bit values across a 32-bit boundary:
/// - `i64_low` / `i64_high` split a 64-bit local into two i32 words
/// - `recreate_i64` joins a low and a high word back into an i64
///

use super::expr::{BinaryOp, Expression, UnaryOp};
use super::types::{Literal, Name, ValType};

pub struct Builder;

impl Builder {
    pub fn constant(lit: Literal) -> Expression {
        Expression::Const(lit)
    }

    pub fn local_get(index: usize, ty: ValType) -> Expression {
        Expression::LocalGet {
            index: index as u32,
            ty,
        }
    }

    pub fn local_set(index: usize, value: Expression) -> Expression {
        Expression::LocalSet {
            index: index as u32,
            value: Box::new(value),
        }
    }

    pub fn local_tee(index: usize, value: Expression) -> Expression {
        Expression::LocalTee {
            index: index as u32,
            value: Box::new(value),
        }
    }

    pub fn global_get(name: Name, ty: ValType) -> Expression {
        Expression::GlobalGet { name, ty }
    }

    pub fn global_set(name: Name, value: Expression) -> Expression {
        Expression::GlobalSet {
            name,
            value: Box::new(value),
        }
    }

    pub fn call(target: Name, operands: Vec<Expression>, ty: Option<ValType>) -> Expression {
        Expression::Call { target, operands, ty }
    }

    pub fn unary(op: UnaryOp, value: Expression) -> Expression {
        Expression::Unary {
            op,
            value: Box::new(value),
        }
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// A block whose type is that of its last element.
    pub fn block(list: Vec<Expression>) -> Expression {
        let ty = list.last().and_then(Expression::ty);
        Expression::Block { list, ty }
    }

    /// `extend_u(low) | (extend_u(high) << 32)`; `low` is evaluated first.
    pub fn recreate_i64(low: Expression, high: Expression) -> Expression {
        Self::binary(
            BinaryOp::OrInt64,
            Self::unary(UnaryOp::ExtendUInt32, low),
            Self::binary(
                BinaryOp::ShlInt64,
                Self::unary(UnaryOp::ExtendUInt32, high),
                Self::constant(Literal::I64(32)),
            ),
        )
    }

    pub fn recreate_i64_from_locals(low: usize, high: usize) -> Expression {
        Self::recreate_i64(
            Self::local_get(low, ValType::I32),
            Self::local_get(high, ValType::I32),
        )
    }

    pub fn i64_low(index: usize) -> Expression {
        Self::unary(UnaryOp::WrapInt64, Self::local_get(index, ValType::I64))
    }

    pub fn i64_high(index: usize) -> Expression {
        Self::unary(
            UnaryOp::WrapInt64,
            Self::binary(
                BinaryOp::ShrUInt64,
                Self::local_get(index, ValType::I64),
                Self::constant(Literal::I64(32)),
            ),
        )
    }
}

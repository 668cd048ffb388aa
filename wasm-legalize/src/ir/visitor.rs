//!
//! Expression Visitors
//!
//! Two traversal traits over expression trees:
//! - `Visitor` for read-only analysis
//! - `VisitorMut` for in-place rewriting
//!
//! Usage:
//! - Implement the trait
//! - Override `visit_expr` (or `visit_call` for the mutable walker)
//! - Call the matching `walk_*` function to recurse into children
//!
//! `VisitorMut` walks in post-order: children are rewritten before their
//! parent is offered to the visitor, so a replacement node never gets
//! revisited.
//!

use super::expr::Expression;

pub trait Visitor: Sized {
    fn visit_expr(&mut self, expr: &Expression) {
        walk_expr(self, expr)
    }
}

pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Expression) {
    match expr {
        Expression::Const(_) | Expression::LocalGet { .. } | Expression::GlobalGet { .. } | Expression::Nop => {}
        Expression::LocalSet { value, .. }
        | Expression::LocalTee { value, .. }
        | Expression::GlobalSet { value, .. }
        | Expression::Unary { value, .. }
        | Expression::Drop(value) => v.visit_expr(value),
        Expression::Call { operands, .. } => {
            for operand in operands {
                v.visit_expr(operand);
            }
        }
        Expression::CallIndirect { index, operands, .. } => {
            for operand in operands {
                v.visit_expr(operand);
            }
            v.visit_expr(index);
        }
        Expression::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expression::Block { list, .. } => {
            for child in list {
                v.visit_expr(child);
            }
        }
    }
}

pub trait VisitorMut: Sized {
    fn visit_expr(&mut self, expr: &mut Expression) {
        walk_expr_mut(self, expr);
        if matches!(expr, Expression::Call { .. }) {
            self.visit_call(expr);
        }
    }

    /// Called with every `Expression::Call` after its operands were visited.
    /// The node may be replaced wholesale.
    fn visit_call(&mut self, _call: &mut Expression) {}
}

pub fn walk_expr_mut<V: VisitorMut>(v: &mut V, expr: &mut Expression) {
    match expr {
        Expression::Const(_) | Expression::LocalGet { .. } | Expression::GlobalGet { .. } | Expression::Nop => {}
        Expression::LocalSet { value, .. }
        | Expression::LocalTee { value, .. }
        | Expression::GlobalSet { value, .. }
        | Expression::Unary { value, .. }
        | Expression::Drop(value) => v.visit_expr(value),
        Expression::Call { operands, .. } => {
            for operand in operands {
                v.visit_expr(operand);
            }
        }
        Expression::CallIndirect { index, operands, .. } => {
            for operand in operands {
                v.visit_expr(operand);
            }
            v.visit_expr(index);
        }
        Expression::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expression::Block { list, .. } => {
            for child in list {
                v.visit_expr(child);
            }
        }
    }
}

///
/// Module Printer
///
/// Renders a module as WebAssembly-flavoured S-expressions. Output is fully
/// deterministic (entities print in module order) so it can be used for
/// snapshot tests and for the CLI `print` command.
///
/// Section order: types, imports, globals, table segments, exports, defined
/// functions. Leaf expressions print on one line; a node with children
/// prints its head, one child per line indented by two spaces, and a closing
/// parenthesis on its own line.
///

use std::fmt::Write;

use super::expr::Expression;
use super::module::{ExportKind, Function, FunctionKind, Module};
use super::types::Signature;

pub fn print_module(module: &Module) -> String {
    let mut p = Printer { out: String::new() };
    p.out.push_str("(module\n");

    for ty in module.function_types() {
        let _ = writeln!(p.out, "  (type ${} (func{}))", ty.name, sig_suffix(&ty.sig));
    }
    for func in module.functions() {
        if let FunctionKind::Imported(linkage) = &func.kind {
            let _ = writeln!(
                p.out,
                "  (import \"{}\" \"{}\" (func ${}{}{}))",
                linkage.module,
                linkage.base,
                func.name,
                type_use(func),
                sig_suffix(&func.sig)
            );
        }
    }
    for global in module.globals() {
        let ty = if global.mutable {
            format!("(mut {})", global.ty)
        } else {
            global.ty.to_string()
        };
        let _ = writeln!(p.out, "  (global ${} {} ({}))", global.name, ty, global.init);
    }
    for segment in &module.table.segments {
        let _ = write!(p.out, "  (elem (i32.const {})", segment.offset);
        for name in &segment.data {
            let _ = write!(p.out, " ${}", name);
        }
        p.out.push_str(")\n");
    }
    for export in module.exports() {
        let kind = match export.kind {
            ExportKind::Function => "func",
            ExportKind::Global => "global",
        };
        let _ = writeln!(p.out, "  (export \"{}\" ({} ${}))", export.name, kind, export.value);
    }
    for func in module.functions() {
        if let FunctionKind::Defined(body) = &func.kind {
            let _ = writeln!(p.out, "  (func ${}{}{}", func.name, type_use(func), sig_suffix(&func.sig));
            if !body.vars.is_empty() {
                p.out.push_str("    (local");
                for var in &body.vars {
                    let _ = write!(p.out, " {}", var);
                }
                p.out.push_str(")\n");
            }
            p.expr(&body.expr, 2);
            p.out.push_str("  )\n");
        }
    }

    p.out.push_str(")\n");
    p.out
}

fn type_use(func: &Function) -> String {
    match &func.type_ref {
        Some(ty) => format!(" (type ${})", ty),
        None => String::new(),
    }
}

fn sig_suffix(sig: &Signature) -> String {
    let mut s = String::new();
    if !sig.params.is_empty() {
        s.push_str(" (param");
        for param in &sig.params {
            let _ = write!(s, " {}", param);
        }
        s.push(')');
    }
    if let Some(result) = sig.result {
        let _ = write!(s, " (result {})", result);
    }
    s
}

struct Printer {
    out: String,
}

impl Printer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn node(&mut self, depth: usize, head: &str, children: &[&Expression]) {
        if children.is_empty() {
            self.line(depth, &format!("({})", head));
            return;
        }
        self.line(depth, &format!("({}", head));
        for child in children {
            self.expr(child, depth + 1);
        }
        self.line(depth, ")");
    }

    fn expr(&mut self, expr: &Expression, depth: usize) {
        match expr {
            Expression::Const(lit) => self.line(depth, &format!("({})", lit)),
            Expression::LocalGet { index, .. } => self.line(depth, &format!("(local.get ${})", index)),
            Expression::LocalSet { index, value } => {
                self.node(depth, &format!("local.set ${}", index), &[&**value])
            }
            Expression::LocalTee { index, value } => {
                self.node(depth, &format!("local.tee ${}", index), &[&**value])
            }
            Expression::GlobalGet { name, .. } => self.line(depth, &format!("(global.get ${})", name)),
            Expression::GlobalSet { name, value } => {
                self.node(depth, &format!("global.set ${}", name), &[&**value])
            }
            Expression::Call { target, operands, .. } => {
                let children: Vec<&Expression> = operands.iter().collect();
                self.node(depth, &format!("call ${}", target), &children);
            }
            Expression::CallIndirect { index, operands, sig } => {
                let mut children: Vec<&Expression> = operands.iter().collect();
                children.push(&**index);
                self.node(depth, &format!("call_indirect (type (func{}))", sig_suffix(sig)), &children);
            }
            Expression::Unary { op, value } => self.node(depth, op.mnemonic(), &[&**value]),
            Expression::Binary { op, left, right } => self.node(depth, op.mnemonic(), &[&**left, &**right]),
            Expression::Block { list, ty } => {
                let head = match ty {
                    Some(ty) => format!("block (result {})", ty),
                    None => "block".to_string(),
                };
                let children: Vec<&Expression> = list.iter().collect();
                self.node(depth, &head, &children);
            }
            Expression::Drop(value) => self.node(depth, "drop", &[&**value]),
            Expression::Nop => self.line(depth, "(nop)"),
        }
    }
}

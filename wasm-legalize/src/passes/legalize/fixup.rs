//! Redirects direct calls to removed illegal imports to their stubs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::ir::{Expression, Module, Name, VisitorMut};
use crate::passes::{FunctionBody, FunctionPass};

pub struct FixImports<'a> {
    map: &'a HashMap<Name, Name>,
    redirected: AtomicUsize,
}

impl<'a> FixImports<'a> {
    pub fn new(map: &'a HashMap<Name, Name>) -> Self {
        Self {
            map,
            redirected: AtomicUsize::new(0),
        }
    }

    pub fn redirected(&self) -> usize {
        self.redirected.load(Ordering::Relaxed)
    }
}

impl FunctionPass for FixImports<'_> {
    fn name(&self) -> &'static str {
        "fix-imports"
    }

    fn run_on_function(&self, _module: &Module, func: &mut FunctionBody) {
        let mut fixer = CallFixer {
            map: self.map,
            current: &func.name,
            redirected: 0,
        };
        fixer.visit_expr(&mut func.expr);
        if fixer.redirected > 0 {
            self.redirected.fetch_add(fixer.redirected, Ordering::Relaxed);
        }
    }
}

struct CallFixer<'a> {
    map: &'a HashMap<Name, Name>,
    current: &'a Name,
    redirected: usize,
}

impl VisitorMut for CallFixer<'_> {
    fn visit_call(&mut self, call: &mut Expression) {
        let Expression::Call { target, .. } = call else {
            return;
        };
        let Some(stub) = self.map.get(&*target) else {
            return;
        };
        // The stub itself is where the real import is still called.
        if stub == self.current {
            return;
        }
        trace!(function = %self.current, from = %target, to = %stub, "redirected call");
        *target = stub.clone();
        self.redirected += 1;
    }
}

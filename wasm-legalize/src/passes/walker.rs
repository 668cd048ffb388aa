//!
//! Function-Parallel Walker
//!
//! Runs a `FunctionPass` over every defined function body, spreading the
//! bodies across worker threads.
//!
//! The bodies are detached from the module before the workers start. Each
//! worker then holds a shared `&Module` (signatures, imports, exports, globals
//! and table stay readable) plus exclusive access to its own slice of bodies,
//! so no locking is needed. Bodies are reattached once every worker has
//! joined. While detached, a function's body in the module reads as `nop`.
//!
//! Worker count defaults to the number of available cores.
//!

use std::thread;

use tracing::debug;

use crate::ir::{Body, Expression, FunctionKind, Module, Name, Signature, ValType};

/// A function body detached from its module for the duration of a walk.
#[derive(Debug)]
pub struct FunctionBody {
    pub name: Name,
    pub sig: Signature,
    pub vars: Vec<ValType>,
    pub expr: Expression,
}

/// Appends a local after the parameters and existing locals; returns its index.
pub fn add_var(sig: &Signature, vars: &mut Vec<ValType>, ty: ValType) -> u32 {
    vars.push(ty);
    (sig.params.len() + vars.len() - 1) as u32
}

pub trait FunctionPass: Sync {
    fn name(&self) -> &'static str;

    fn run_on_function(&self, module: &Module, func: &mut FunctionBody);
}

pub fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn run_function_parallel<P: FunctionPass + ?Sized>(module: &mut Module, pass: &P, threads: usize) {
    let mut bodies = detach_bodies(module);
    if bodies.is_empty() {
        return;
    }

    let workers = threads.clamp(1, bodies.len());
    debug!(
        pass = pass.name(),
        functions = bodies.len(),
        workers,
        "running function-parallel pass"
    );

    let view: &Module = module;
    if workers == 1 {
        for body in bodies.iter_mut() {
            pass.run_on_function(view, body);
        }
    } else {
        let chunk = bodies.len().div_ceil(workers);
        thread::scope(|scope| {
            for part in bodies.chunks_mut(chunk) {
                scope.spawn(move || {
                    for body in part {
                        pass.run_on_function(view, body);
                    }
                });
            }
        });
    }

    attach_bodies(module, bodies);
}

fn detach_bodies(module: &mut Module) -> Vec<FunctionBody> {
    module
        .functions_mut()
        .filter_map(|func| match &mut func.kind {
            FunctionKind::Defined(body) => {
                let Body { vars, expr } = std::mem::take(body);
                Some(FunctionBody {
                    name: func.name.clone(),
                    sig: func.sig.clone(),
                    vars,
                    expr,
                })
            }
            FunctionKind::Imported(_) => None,
        })
        .collect()
}

fn attach_bodies(module: &mut Module, bodies: Vec<FunctionBody>) {
    for FunctionBody { name, vars, expr, .. } in bodies {
        if let Some(body) = module.function_mut(&name).and_then(|f| f.body_mut()) {
            *body = Body { vars, expr };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::ir::{Builder, Function, Literal};

    struct CountAndMark {
        seen: AtomicUsize,
    }

    impl FunctionPass for CountAndMark {
        fn name(&self) -> &'static str {
            "count-and-mark"
        }

        fn run_on_function(&self, module: &Module, func: &mut FunctionBody) {
            // The module body is a placeholder while detached.
            assert!(matches!(
                module.function(&func.name).and_then(|f| f.body()).map(|b| &b.expr),
                Some(Expression::Nop)
            ));
            self.seen.fetch_add(1, Ordering::SeqCst);
            let index = add_var(&func.sig, &mut func.vars, ValType::I32);
            func.expr = Builder::local_set(index as usize, Builder::constant(Literal::I32(1)));
        }
    }

    fn module_with(count: usize) -> Module {
        let mut module = Module::new();
        for i in 0..count {
            module
                .add_function(Function::defined(
                    format!("f{}", i).as_str(),
                    Signature::new([ValType::I64], None),
                    vec![],
                    Builder::constant(Literal::I32(0)),
                ))
                .unwrap();
        }
        module
            .add_function(Function::imported("imp", Signature::default(), "env", "imp"))
            .unwrap();
        module
    }

    #[test]
    fn test_walks_every_defined_body() {
        for threads in [1, 3, 16] {
            let mut module = module_with(10);
            let pass = CountAndMark { seen: AtomicUsize::new(0) };
            run_function_parallel(&mut module, &pass, threads);

            assert_eq!(pass.seen.load(Ordering::SeqCst), 10);
            for func in module.functions().filter(|f| !f.is_imported()) {
                let body = func.body().unwrap();
                assert_eq!(body.vars, [ValType::I32]);
                assert_eq!(body.expr, Builder::local_set(1, Builder::constant(Literal::I32(1))));
            }
        }
    }

    #[test]
    fn test_empty_module() {
        let mut module = Module::new();
        let pass = CountAndMark { seen: AtomicUsize::new(0) };
        run_function_parallel(&mut module, &pass, 4);
        assert_eq!(pass.seen.load(Ordering::SeqCst), 0);
    }
}

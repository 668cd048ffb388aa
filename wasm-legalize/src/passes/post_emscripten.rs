//!
//! Post-Emscripten Cleanups
//!
//! Small rewrites that are only valid for Emscripten output:
//! - with `emscripten-sbrk-ptr=<i32>`, the `env.emscripten_get_sbrk_ptr`
//!   import becomes a defined function returning that constant
//! - calls to `global.Math.pow` with a constant exponent of 2.0 become a
//!   multiply, and with 0.5 a square root
//!

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, trace};

use crate::ir::{
    BinaryOp, Body, Builder, Expression, FunctionKind, Literal, Module, Signature, UnaryOp, ValType, VisitorMut,
};
use crate::passes::{FunctionBody, FunctionPass, Pass, PassError, PassRunner};

pub const PASS_NAME: &str = "post-emscripten";

pub const SBRK_PTR_ARGUMENT: &str = "emscripten-sbrk-ptr";

const ENV: &str = "env";
const GET_SBRK_PTR: &str = "emscripten_get_sbrk_ptr";
const GLOBAL_MATH: &str = "global.Math";
const POW: &str = "pow";

#[derive(Debug, Default)]
pub struct PostEmscripten;

impl PostEmscripten {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for PostEmscripten {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&mut self, runner: &PassRunner, module: &mut Module) -> Result<(), PassError> {
        if let Some(value) = runner.options().argument(SBRK_PTR_ARGUMENT) {
            let sbrk_ptr = value.trim().parse::<i32>().map_err(|err| PassError::InvalidArgument {
                key: SBRK_PTR_ARGUMENT.to_string(),
                value: value.to_string(),
                reason: err.to_string(),
            })?;
            apply_sbrk_ptr(module, sbrk_ptr);
        }

        let optimizer = OptimizeCalls::default();
        runner.run_function_parallel(module, &optimizer);
        info!(rewritten = optimizer.rewritten(), "optimized math calls");
        Ok(())
    }
}

/// Turns the sbrk pointer import into a function returning `sbrk_ptr`.
fn apply_sbrk_ptr(module: &mut Module, sbrk_ptr: i32) {
    let Some(name) = module.imported_function(ENV, GET_SBRK_PTR).map(|f| f.name.clone()) else {
        return;
    };
    let Some(func) = module.function_mut(&name) else {
        return;
    };
    func.kind = FunctionKind::Defined(Body {
        vars: vec![],
        expr: Builder::constant(Literal::I32(sbrk_ptr)),
    });
    debug!(function = %name, sbrk_ptr, "applied sbrk pointer");
}

#[derive(Default)]
struct OptimizeCalls {
    rewritten: AtomicUsize,
}

impl OptimizeCalls {
    fn rewritten(&self) -> usize {
        self.rewritten.load(Ordering::Relaxed)
    }
}

impl FunctionPass for OptimizeCalls {
    fn name(&self) -> &'static str {
        "optimize-calls"
    }

    fn run_on_function(&self, module: &Module, func: &mut FunctionBody) {
        let mut rewriter = MathCalls {
            module,
            func_sig: &func.sig,
            vars: &mut func.vars,
            rewritten: 0,
        };
        rewriter.visit_expr(&mut func.expr);
        if rewriter.rewritten > 0 {
            trace!(function = %func.name, count = rewriter.rewritten, "rewrote pow calls");
            self.rewritten.fetch_add(rewriter.rewritten, Ordering::Relaxed);
        }
    }
}

struct MathCalls<'a> {
    module: &'a Module,
    func_sig: &'a Signature,
    vars: &'a mut Vec<ValType>,
    rewritten: usize,
}

impl MathCalls<'_> {
    fn is_pow(&self, target: &str) -> bool {
        self.module
            .function(target)
            .and_then(|f| f.import())
            .is_some_and(|linkage| linkage.module == GLOBAL_MATH && linkage.base == POW)
    }

    /// Splits `value` into an expression that stores it once and a local
    /// index that reads it back.
    fn localize(&mut self, value: Expression) -> (Expression, u32) {
        if let Expression::LocalGet { index, .. } = value {
            return (value, index);
        }
        let index = super::walker::add_var(self.func_sig, self.vars, ValType::F64);
        (Builder::local_tee(index as usize, value), index)
    }
}

impl VisitorMut for MathCalls<'_> {
    fn visit_call(&mut self, call: &mut Expression) {
        let Expression::Call { target, operands, .. } = call else {
            return;
        };
        if operands.len() != 2 || !self.is_pow(target) {
            return;
        }
        let exponent = match operands[1].as_const() {
            Some(Literal::F64(bits)) => *bits,
            _ => return,
        };

        let replacement = if exponent == 2.0f64.to_bits() {
            let base = std::mem::take(&mut operands[0]);
            let (stored, index) = self.localize(base);
            Builder::binary(
                BinaryOp::MulFloat64,
                stored,
                Builder::local_get(index as usize, ValType::F64),
            )
        } else if exponent == 0.5f64.to_bits() {
            Builder::unary(UnaryOp::SqrtFloat64, std::mem::take(&mut operands[0]))
        } else {
            return;
        };
        *call = replacement;
        self.rewritten += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Name};
    use crate::passes::PassOptions;

    fn pow_module(base: Expression, exponent: f64) -> Module {
        let mut module = Module::new();
        module
            .add_function(Function::imported(
                "Math_pow",
                Signature::new([ValType::F64, ValType::F64], Some(ValType::F64)),
                GLOBAL_MATH,
                POW,
            ))
            .unwrap();
        module
            .add_function(Function::defined(
                "square",
                Signature::new([ValType::F64], Some(ValType::F64)),
                vec![],
                Builder::call(
                    Name::new("Math_pow"),
                    vec![base, Builder::constant(Literal::f64(exponent))],
                    Some(ValType::F64),
                ),
            ))
            .unwrap();
        module
    }

    fn run(module: &mut Module, options: PassOptions) -> Result<(), PassError> {
        let mut runner = PassRunner::new(options);
        runner.add(PostEmscripten::new());
        runner.run(module)
    }

    fn body(module: &Module, name: &str) -> Body {
        module.function(name).unwrap().body().unwrap().clone()
    }

    #[test]
    fn test_pow_two_reuses_local() {
        let mut module = pow_module(Builder::local_get(0, ValType::F64), 2.0);
        run(&mut module, PassOptions::default()).unwrap();

        let body = body(&module, "square");
        assert!(body.vars.is_empty());
        assert_eq!(
            body.expr,
            Builder::binary(
                BinaryOp::MulFloat64,
                Builder::local_get(0, ValType::F64),
                Builder::local_get(0, ValType::F64),
            )
        );
    }

    #[test]
    fn test_pow_two_localizes_complex_base() {
        let sum = Builder::binary(
            BinaryOp::AddFloat64,
            Builder::local_get(0, ValType::F64),
            Builder::constant(Literal::f64(1.0)),
        );
        let mut module = pow_module(sum.clone(), 2.0);
        run(&mut module, PassOptions::default()).unwrap();

        let body = body(&module, "square");
        assert_eq!(body.vars, [ValType::F64]);
        assert_eq!(
            body.expr,
            Builder::binary(
                BinaryOp::MulFloat64,
                Builder::local_tee(1, sum),
                Builder::local_get(1, ValType::F64),
            )
        );
    }

    #[test]
    fn test_pow_half_is_sqrt() {
        let mut module = pow_module(Builder::local_get(0, ValType::F64), 0.5);
        run(&mut module, PassOptions::default()).unwrap();
        assert_eq!(
            body(&module, "square").expr,
            Builder::unary(UnaryOp::SqrtFloat64, Builder::local_get(0, ValType::F64))
        );
    }

    #[test]
    fn test_other_exponents_untouched() {
        for exponent in [3.0, -2.0, 0.0] {
            let mut module = pow_module(Builder::local_get(0, ValType::F64), exponent);
            let before = module.clone();
            run(&mut module, PassOptions::default()).unwrap();
            assert_eq!(module, before);
        }
    }

    #[test]
    fn test_defined_pow_untouched() {
        let mut module = Module::new();
        module
            .add_function(Function::defined(
                "pow",
                Signature::new([ValType::F64, ValType::F64], Some(ValType::F64)),
                vec![],
                Builder::local_get(0, ValType::F64),
            ))
            .unwrap();
        module
            .add_function(Function::defined(
                "caller",
                Signature::default(),
                vec![],
                Expression::Drop(Box::new(Builder::call(
                    Name::new("pow"),
                    vec![Builder::constant(Literal::f64(1.0)), Builder::constant(Literal::f64(2.0))],
                    Some(ValType::F64),
                ))),
            ))
            .unwrap();
        let before = module.clone();
        run(&mut module, PassOptions::default()).unwrap();
        assert_eq!(module, before);
    }

    #[test]
    fn test_sbrk_ptr_argument() {
        let mut module = Module::new();
        module
            .add_function(Function::imported(
                GET_SBRK_PTR,
                Signature::new([], Some(ValType::I32)),
                ENV,
                GET_SBRK_PTR,
            ))
            .unwrap();
        run(&mut module, PassOptions::default().with_argument(SBRK_PTR_ARGUMENT, "1024")).unwrap();

        let func = module.function(GET_SBRK_PTR).unwrap();
        assert!(!func.is_imported());
        assert_eq!(func.body().unwrap().expr, Builder::constant(Literal::I32(1024)));
    }

    #[test]
    fn test_sbrk_ptr_rejects_garbage() {
        let mut module = Module::new();
        let err = run(&mut module, PassOptions::default().with_argument(SBRK_PTR_ARGUMENT, "0x10"))
            .unwrap_err();
        assert!(matches!(err, PassError::InvalidArgument { ref key, .. } if key == SBRK_PTR_ARGUMENT));
    }
}

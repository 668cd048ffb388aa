///
/// wasm_legalize - Host ABI legalization for WebAssembly modules
///
/// A host that can only pass i32 and f64 values cannot call i64 or f32
/// functions directly. This crate rewrites a module's imports, exports and
/// indirect-call table so the host-visible surface is legal, and keeps the
/// module's internal code working unchanged. It includes:
///
/// - ir: Module representation, builder, visitors and printer
/// - passes: Pass runner, `legalize-js-interface` and `post-emscripten`
/// - interp: A small evaluator for checking rewritten modules
/// - diagnostic: miette rendering of pass failures
/// - config: TOML run configuration
///
/// Entry points:
/// - `legalize_js_interface`: Legalize one module with default options
/// - `PassRunner`: Run a named pipeline with options
/// - `Instance`: Evaluate exports of a module
///

pub mod config;
pub mod diagnostic;
pub mod interp;
pub mod ir;
pub mod passes;

pub use config::{Config, ConfigError};
pub use diagnostic::DiagnosticReporter;
pub use interp::{Globals, HostFunctions, Instance, Trap};
pub use ir::{print_module, Module};
pub use passes::legalize::{legalize_js_interface, LegalizeSummary};
pub use passes::{create_pass, Pass, PassError, PassOptions, PassRunner};

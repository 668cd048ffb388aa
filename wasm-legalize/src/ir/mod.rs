///
/// Module IR
///
/// The in-memory representation every pass operates on:
/// - types: value types, signatures, literals and names
/// - expr: expression trees forming function bodies
/// - module: the entity container (functions, types, exports, globals, table)
/// - builder: constructors for synthesized code
/// - visitor: read-only and rewriting traversals
/// - printer: deterministic text rendering
///

pub mod builder;
pub mod error;
pub mod expr;
pub mod module;
pub mod printer;
pub mod types;
pub mod visitor;

pub use builder::Builder;
pub use error::ModuleError;
pub use expr::{BinaryOp, Expression, UnaryOp};
pub use module::{
    Body, Ensured, Export, ExportKind, Function, FunctionKind, FunctionType, Global, ImportLinkage,
    Module, Segment, Table,
};
pub use printer::print_module;
pub use types::{Literal, Name, ParamList, Signature, ValType};
pub use visitor::{walk_expr, walk_expr_mut, Visitor, VisitorMut};

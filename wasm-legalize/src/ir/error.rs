///
/// Module Error Types
///
/// Errors raised by the module mutation API and by `Module::validate`.
/// They indicate a broken caller contract (duplicate or dangling names),
/// never a property of the input program that a pass should recover from.
///

use thiserror::Error;

use super::types::Name;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("duplicate function '{0}'")]
    DuplicateFunction(Name),

    #[error("duplicate function type '{0}'")]
    DuplicateFunctionType(Name),

    #[error("duplicate export '{0}'")]
    DuplicateExport(Name),

    #[error("duplicate global '{0}'")]
    DuplicateGlobal(Name),

    #[error("unknown function '{0}'")]
    UnknownFunction(Name),

    #[error("unknown function type '{0}'")]
    UnknownFunctionType(Name),

    #[error("unknown export '{0}'")]
    UnknownExport(Name),

    #[error("unknown global '{0}'")]
    UnknownGlobal(Name),

    #[error("export '{export}' targets missing {kind} '{target}'")]
    DanglingExport {
        export: Name,
        kind: &'static str,
        target: Name,
    },

    #[error("table segment {segment} entry {entry} names missing function '{target}'")]
    DanglingTableEntry {
        segment: usize,
        entry: usize,
        target: Name,
    },

    #[error("function '{function}' calls missing function '{target}'")]
    DanglingCall { function: Name, target: Name },

    #[error("function '{function}' references global '{global}' which does not exist")]
    DanglingGlobal { function: Name, global: Name },

    #[error("function '{function}' refers to type '{ty}' which does not match its signature")]
    TypeMismatch { function: Name, ty: Name },
}

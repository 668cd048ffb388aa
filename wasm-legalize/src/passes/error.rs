///
/// Pass Error Types
///
/// Errors a pass run can end with. Every variant is fatal for the run: the
/// runner stops at the first failing pass and nothing after it executes.
///
/// Error categories:
/// - InconsistentChannel: only half of the getTempRet0/setTempRet0 pair is present
/// - InvalidArgument: a pass argument could not be parsed
/// - UnknownPass: a pass name not present in the registry
/// - Validation: the module broke an invariant after a pass ran
/// - Module: a mutation hit a duplicate or missing entity
///

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::ir::{ModuleError, Name};

/// Where a half-present channel was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSource {
    Imported,
    Exported,
}

impl fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSource::Imported => f.write_str("imported"),
            ChannelSource::Exported => f.write_str("exported"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PassError {
    #[error("cannot handle a partial tempRet0 pair: '{present}' is {via} but '{missing}' is not")]
    #[diagnostic(
        code(legalize::inconsistent_channel),
        help("getTempRet0 and setTempRet0 must both be provided, or neither")
    )]
    InconsistentChannel {
        present: Name,
        missing: Name,
        via: ChannelSource,
    },

    #[error("invalid value '{value}' for pass argument '{key}': {reason}")]
    #[diagnostic(code(pass::invalid_argument))]
    InvalidArgument {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown pass '{0}'")]
    #[diagnostic(
        code(pass::unknown),
        help("available passes: legalize-js-interface, post-emscripten")
    )]
    UnknownPass(String),

    #[error("module is invalid after pass '{pass}'")]
    #[diagnostic(code(pass::validation))]
    Validation {
        pass: &'static str,
        #[source]
        source: ModuleError,
    },

    #[error(transparent)]
    #[diagnostic(code(ir::module))]
    Module(#[from] ModuleError),
}

//!
//! Diagnostic Module - Pass Error Reporting
//!
//! Renders pass failures with miette against the printed text of the module
//! that was being transformed, so the offending import, export or function
//! is pointed at directly.
//!
//! Usage:
//!   let reporter = DiagnosticReporter::new("input.json", &module);
//!   reporter.report_pass_error(&err);
//!

use miette::{Diagnostic, LabeledSpan, NamedSource, Report, SourceSpan};
use thiserror::Error;

use crate::config::ConfigError;
use crate::ir::{print_module, Module, ModuleError};
use crate::passes::{ChannelSource, PassError};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct LegalizeDiagnostic {
    message: String,
    code: Option<String>,
    src: NamedSource<String>,
    span: Option<SourceSpan>,
    label: String,
    help_text: Option<String>,
}

impl Diagnostic for LegalizeDiagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.code
            .as_ref()
            .map(|c| Box::new(c.clone()) as Box<dyn std::fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        Some(Box::new(std::iter::once(LabeledSpan::new_primary_with_span(
            Some(self.label.clone()),
            span,
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn std::fmt::Display>)
    }
}

impl LegalizeDiagnostic {
    pub fn from_pass_error(err: &PassError, name: &str, text: &str) -> Self {
        let (needle, label) = locate(err);
        let span = needle.and_then(|needle| {
            text.find(&needle)
                .map(|offset| SourceSpan::from((offset, needle.len())))
        });

        Self {
            message: err.to_string(),
            code: err.code().map(|c| c.to_string()),
            src: NamedSource::new(name, text.to_string()),
            span,
            label,
            help_text: err.help().map(|h| h.to_string()),
        }
    }

    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }
}

/// Text to search for in the printed module, and the label to put on it.
fn locate(err: &PassError) -> (Option<String>, String) {
    match err {
        PassError::InconsistentChannel { present, missing, via } => {
            let needle = match via {
                ChannelSource::Imported => format!("\"{}\" (func", present),
                ChannelSource::Exported => format!("(export \"{}\"", present),
            };
            (Some(needle), format!("{} without {}", via, missing))
        }
        PassError::Validation { source, .. } | PassError::Module(source) => locate_module_error(source),
        PassError::InvalidArgument { .. } | PassError::UnknownPass(_) => (None, String::new()),
    }
}

fn locate_module_error(err: &ModuleError) -> (Option<String>, String) {
    match err {
        ModuleError::DanglingExport { export, target, .. } => (
            Some(format!("(export \"{}\"", export)),
            format!("'{}' does not exist", target),
        ),
        ModuleError::DanglingCall { function, target } => (
            Some(format!("(func ${}", function)),
            format!("calls missing '{}'", target),
        ),
        ModuleError::DanglingGlobal { function, global } => (
            Some(format!("(func ${}", function)),
            format!("uses missing global '{}'", global),
        ),
        ModuleError::TypeMismatch { function, ty } => (
            Some(format!("${} (type ${})", function, ty)),
            format!("does not match type '{}'", ty),
        ),
        ModuleError::DanglingTableEntry { target, .. } => (
            Some(format!(" ${}", target)),
            "not a function".to_string(),
        ),
        _ => (None, String::new()),
    }
}

pub struct DiagnosticReporter {
    name: String,
    text: String,
}

impl DiagnosticReporter {
    /// `module` should be the module as it was when the failing run started.
    pub fn new(name: impl Into<String>, module: &Module) -> Self {
        Self {
            name: name.into(),
            text: print_module(module),
        }
    }

    pub fn report_pass_error(&self, err: &PassError) {
        let diag = LegalizeDiagnostic::from_pass_error(err, &self.name, &self.text);
        let report = Report::new(diag);
        eprintln!("{:?}", report);
    }

    pub fn report_config_error(err: ConfigError) {
        let report = Report::new(err);
        eprintln!("{:?}", report);
    }
}

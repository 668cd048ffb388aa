///
/// Pass Engine
///
/// Passes transform a `Module` in place. A `PassRunner` holds an ordered list
/// of passes and the options they read, runs them one after another, and
/// stops at the first error.
///
/// Pipeline:
/// 1. Build `PassOptions` (CLI flags and/or a config file)
/// 2. Add passes by value or by registry name
/// 3. `run` the module through them, optionally validating after each pass
///
/// Passes that only rewrite function bodies implement `FunctionPass` and are
/// driven through `PassRunner::run_function_parallel`.
///

pub mod error;
pub mod legalize;
pub mod post_emscripten;
pub mod walker;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::ir::Module;

pub use error::{ChannelSource, PassError};
pub use legalize::LegalizeJsInterface;
pub use post_emscripten::PostEmscripten;
pub use walker::{FunctionBody, FunctionPass};

/// Names accepted by `create_pass`.
pub const PASS_NAMES: &[&str] = &[legalize::PASS_NAME, post_emscripten::PASS_NAME];

pub trait Pass: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, runner: &PassRunner, module: &mut Module) -> Result<(), PassError>;
}

pub fn create_pass(name: &str) -> Option<Box<dyn Pass>> {
    match name {
        legalize::PASS_NAME => Some(Box::new(LegalizeJsInterface::new())),
        post_emscripten::PASS_NAME => Some(Box::new(PostEmscripten::new())),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Free-form `key=value` arguments read by individual passes.
    pub arguments: IndexMap<String, String>,
    /// Worker threads for function-parallel passes; `None` uses every core.
    pub threads: Option<usize>,
    /// Run `Module::validate` after each pass.
    pub validate: bool,
}

impl PassOptions {
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).map(String::as_str)
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(walker::default_threads).max(1)
    }
}

pub struct PassRunner {
    options: PassOptions,
    passes: Vec<Box<dyn Pass>>,
    nested: bool,
}

impl PassRunner {
    pub fn new(options: PassOptions) -> Self {
        Self {
            options,
            passes: Vec::new(),
            nested: false,
        }
    }

    /// A runner used from inside another pass; it shares the parent's options.
    pub fn nested(parent: &PassRunner) -> Self {
        Self {
            options: parent.options.clone(),
            passes: Vec::new(),
            nested: true,
        }
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    pub fn add(&mut self, pass: impl Pass + 'static) -> &mut Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn add_by_name(&mut self, name: &str) -> Result<&mut Self, PassError> {
        let pass = create_pass(name).ok_or_else(|| PassError::UnknownPass(name.to_string()))?;
        self.passes.push(pass);
        Ok(self)
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, module: &mut Module) -> Result<(), PassError> {
        let mut passes = std::mem::take(&mut self.passes);
        let result = self.run_passes(&mut passes, module);
        self.passes = passes;
        result
    }

    fn run_passes(&self, passes: &mut [Box<dyn Pass>], module: &mut Module) -> Result<(), PassError> {
        for pass in passes.iter_mut() {
            let name = pass.name();
            if self.nested {
                debug!(pass = name, "running nested pass");
            } else {
                info!(pass = name, "running pass");
            }
            pass.run(self, module)?;
            if self.options.validate {
                module
                    .validate()
                    .map_err(|source| PassError::Validation { pass: name, source })?;
            }
            if !self.nested {
                info!(pass = name, "finished pass");
            }
        }
        Ok(())
    }

    pub fn run_function_parallel<P: FunctionPass + ?Sized>(&self, module: &mut Module, pass: &P) {
        walker::run_function_parallel(module, pass, self.options.worker_threads());
    }
}

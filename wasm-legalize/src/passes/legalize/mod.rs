///
/// JS Interface Legalization
///
/// Rewrites the host-visible surface of a module so every boundary signature
/// uses only i32 and f64. i64 values cross as (low, high) i32 pairs with the
/// high word of a returned i64 passed through the tempRet0 channel; f32 values
/// cross widened to f64.
///
/// Phases:
/// 1. Resolve the high-word channel (fails before any change on a half pair)
/// 2. Repoint illegal exports at `legalstub$` trampolines
/// 3. Replace illegal imports with `legalimport$` plus `legalfunc$` stubs,
///    remap table entries and drop the originals
/// 4. Redirect call sites of the dropped imports, in parallel over bodies
///
/// Running the pass on its own output changes nothing.
///

pub mod channel;
pub mod exports;
pub mod fixup;
pub mod imports;
pub mod legality;

use tracing::info;

use crate::ir::Module;
use crate::passes::{Pass, PassError, PassOptions, PassRunner};

pub use channel::{ChannelOrigin, HighWordChannel};
pub use legality::{is_illegal, legalize_signature};

use fixup::FixImports;

pub const PASS_NAME: &str = "legalize-js-interface";

/// What one run of the pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalizeSummary {
    pub channel: HighWordChannel,
    pub export_stubs: usize,
    pub import_stubs: usize,
    pub redirected_calls: usize,
}

#[derive(Debug, Default)]
pub struct LegalizeJsInterface {
    summary: Option<LegalizeSummary>,
}

impl LegalizeJsInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of the last successful run.
    pub fn summary(&self) -> Option<&LegalizeSummary> {
        self.summary.as_ref()
    }
}

impl Pass for LegalizeJsInterface {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&mut self, runner: &PassRunner, module: &mut Module) -> Result<(), PassError> {
        self.summary = None;
        self.summary = Some(legalize(runner, module)?);
        Ok(())
    }
}

/// Runs the pass once over `module` with default options.
pub fn legalize_js_interface(module: &mut Module) -> Result<LegalizeSummary, PassError> {
    legalize(&PassRunner::new(PassOptions::default()), module)
}

fn legalize(runner: &PassRunner, module: &mut Module) -> Result<LegalizeSummary, PassError> {
    let channel = HighWordChannel::resolve(module)?;
    let export_stubs = exports::legalize_exports(module, &channel)?;
    let map = imports::legalize_imports(module, &channel)?;

    let mut redirected_calls = 0;
    if !map.is_empty() {
        let nested = PassRunner::nested(runner);
        let fixer = FixImports::new(&map);
        nested.run_function_parallel(module, &fixer);
        redirected_calls = fixer.redirected();
    }

    info!(
        channel = ?channel.origin,
        export_stubs,
        import_stubs = map.len(),
        redirected_calls,
        "legalized js interface"
    );
    Ok(LegalizeSummary {
        channel,
        export_stubs,
        import_stubs: map.len(),
        redirected_calls,
    })
}

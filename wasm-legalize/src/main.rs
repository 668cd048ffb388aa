///
/// wasm-legalize CLI - Host ABI legalization for WebAssembly modules
///
/// Reads modules in their JSON form and provides:
/// - wasm-legalize run <file>: Run a pass pipeline (default: legalize-js-interface)
/// - wasm-legalize print <file>: Print a module as S-expressions
/// - wasm-legalize check <file>: List boundary signatures the host cannot call
///

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

use wasm_legalize::ir::ExportKind;
use wasm_legalize::passes::legalize::{is_illegal, PASS_NAME};
use wasm_legalize::{print_module, Config, DiagnosticReporter, Module, PassRunner};

#[derive(Parser)]
#[command(name = "wasm-legalize")]
#[command(author, version, about = "Legalize the host-visible surface of WebAssembly modules", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run passes over a module
    Run {
        /// Module to transform (JSON)
        input: PathBuf,

        /// Where to write the result; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pass to run, in order; may be repeated
        #[arg(short, long = "pass")]
        passes: Vec<String>,

        /// Pass argument as KEY=VALUE; may be repeated
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Worker threads for function-parallel passes
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// TOML file with passes, threads, validate and arguments
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip module validation after each pass
        #[arg(long)]
        no_validate: bool,

        /// Print the result as S-expressions instead of JSON
        #[arg(long)]
        print: bool,
    },

    /// Print a module as S-expressions
    Print {
        /// Module to print (JSON)
        input: PathBuf,
    },

    /// Report imports and exports with i64 or f32 in their signature
    Check {
        /// Module to check (JSON)
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            output,
            passes,
            args,
            threads,
            config,
            no_validate,
            print,
        } => {
            let config = build_config(config.as_deref(), passes, &args, threads, no_validate);
            run_passes(&input, output.as_deref(), &config, print);
        }
        Commands::Print { input } => {
            let module = load_module(&input);
            print!("{}", print_module(&module));
        }
        Commands::Check { input } => {
            check_module(&input);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

fn build_config(
    path: Option<&Path>,
    passes: Vec<String>,
    args: &[String],
    threads: Option<usize>,
    no_validate: bool,
) -> Config {
    let mut config = match path {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                DiagnosticReporter::report_config_error(e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if !passes.is_empty() {
        config.passes = passes;
    }
    if config.passes.is_empty() {
        config.passes.push(PASS_NAME.to_string());
    }
    for arg in args {
        if let Err(e) = config.set_argument(arg) {
            DiagnosticReporter::report_config_error(e);
            std::process::exit(1);
        }
    }
    if threads.is_some() {
        config.threads = threads;
    }
    if no_validate {
        config.validate = false;
    }
    config
}

fn load_module(path: &Path) -> Module {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file: {}", e);
            std::process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("Error parsing module {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn run_passes(input: &Path, output: Option<&Path>, config: &Config, print: bool) {
    let mut module = load_module(input);
    let reporter = DiagnosticReporter::new(input.display().to_string(), &module);

    let mut runner = PassRunner::new(config.to_options());
    for name in &config.passes {
        if let Err(e) = runner.add_by_name(name) {
            reporter.report_pass_error(&e);
            std::process::exit(1);
        }
    }
    if let Err(e) = runner.run(&mut module) {
        reporter.report_pass_error(&e);
        std::process::exit(1);
    }

    let rendered = if print {
        print_module(&module)
    } else {
        match serde_json::to_string_pretty(&module) {
            Ok(json) => json + "\n",
            Err(e) => {
                eprintln!("Error serializing module: {}", e);
                std::process::exit(1);
            }
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, rendered) {
                eprintln!("Error writing {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
        None => print!("{}", rendered),
    }
}

fn check_module(input: &Path) {
    let module = load_module(input);
    let mut illegal = 0;

    for export in module.exports().filter(|e| e.kind == ExportKind::Function) {
        if let Some(func) = module.function(&export.value) {
            if is_illegal(&func.sig) {
                println!("export \"{}\" (func ${}): {}", export.name, func.name, func.sig);
                illegal += 1;
            }
        }
    }
    for func in module.functions() {
        if let Some(linkage) = func.import() {
            if is_illegal(&func.sig) {
                println!(
                    "import \"{}\" \"{}\" (func ${}): {}",
                    linkage.module, linkage.base, func.name, func.sig
                );
                illegal += 1;
            }
        }
    }

    if illegal > 0 {
        eprintln!("{} illegal boundary signature(s) in {}", illegal, input.display());
        std::process::exit(1);
    } else {
        println!("No illegal boundary signatures in {}", input.display());
    }
}

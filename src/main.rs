use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use glint::ast::Span;
use glint::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use glint::vm::{Vm, fixed};
use glint::{Compilation, Registry, SyscallList};

const DEFAULT_STACK: usize = 4096;

#[derive(Parser)]
#[command(name = "glint", about = "Compile and run glint scripts", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Log to stderr: -v for debug, -vv for every executed instruction
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// How diagnostics are printed
    #[arg(long, value_enum, default_value_t = Format::Ansi, global = true)]
    format: Format,

    /// Never colour ansi diagnostics
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Ansi,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a script and run it, printing the returned value
    Run {
        file: PathBuf,
        /// VM stack size in cells (at most 65535)
        #[arg(long, default_value_t = DEFAULT_STACK)]
        stack: usize,
        /// Call this function instead of the program entry
        #[arg(long)]
        function: Option<String>,
        /// Arguments for --function, as decimal numbers
        #[arg(value_parser = parse_fixed, allow_negative_numbers = true)]
        args: Vec<i32>,
    },
    /// Compile a script to a bytecode image
    Build {
        file: PathBuf,
        /// Output path (defaults to the script path with a .glc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a bytecode image produced by `build`
    Exec {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_STACK)]
        stack: usize,
    },
    /// Show the compiled tree or the disassembly
    Dump {
        file: PathBuf,
        /// Serialize the tree as JSON
        #[arg(long, conflicts_with = "listing")]
        json: bool,
        /// Disassemble the bytecode
        #[arg(long)]
        listing: bool,
    },
    /// Explain an error code, or list all codes
    Explain { code: Option<String> },
}

fn parse_fixed(s: &str) -> Result<i32, String> {
    let v: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !(-32768.0..32768.0).contains(&v) {
        return Err(format!("{s} is outside the fixed-point range"));
    }
    Ok(fixed::from_f64(v))
}

// ---- Logging ----

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// ---- Diagnostics output ----

struct Reporter {
    format: Format,
    color: bool,
}

impl Reporter {
    fn emit(&self, d: Diagnostic, source: Option<&str>) {
        let d = match source {
            Some(s) => d.with_source(s),
            None => d,
        };
        match self.format {
            Format::Ansi => eprint!("{}", AnsiRenderer { use_color: self.color }.render(&d)),
            Format::Json => eprintln!("{}", json::render(&d)),
        }
    }
}

/// Diagnostics that stopped a command, with the source they point into.
struct Failure {
    diagnostics: Vec<Diagnostic>,
    source: Option<String>,
}

impl From<Diagnostic> for Failure {
    fn from(d: Diagnostic) -> Self {
        Failure { diagnostics: vec![d], source: None }
    }
}

type CmdResult = Result<(), Failure>;

// ---- Host ----

/// Builtins plus the syscalls only the command line provides. `build` and
/// `exec` must agree on this list for handles to line up.
fn host_registry() -> Result<Registry, Failure> {
    let mut registry = Registry::with_builtins();
    let host = SyscallList::new("host").entry("print", 1, |_, args| {
        let v = args.first().copied().unwrap_or(0);
        println!("{}", fixed::format(v));
        Ok(v)
    });
    registry.add_list(host).map_err(|e| Diagnostic::from(&e))?;
    Ok(registry)
}

fn read_source(path: &Path) -> Result<String, Failure> {
    std::fs::read_to_string(path)
        .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", path.display())).into())
}

fn compile_file(path: &Path, registry: &Registry) -> Result<(Compilation, String), Failure> {
    let source = read_source(path)?;
    let mut reported: Vec<(Span, String)> = Vec::new();
    let mut sink = |span: Span, message: &str| reported.push((span, message.to_string()));
    match glint::compile_with_sink(&source, registry, &mut sink) {
        Ok(c) => Ok((c, source)),
        Err(first) => {
            // the sink saw `first` as its first report; the rest carry no code
            let mut diagnostics = vec![Diagnostic::from(&first)];
            diagnostics.extend(
                reported
                    .into_iter()
                    .skip(1)
                    .map(|(span, message)| Diagnostic::error(message).with_span(span, "here")),
            );
            Err(Failure { diagnostics, source: Some(source) })
        }
    }
}

// ---- Commands ----

fn run(file: &Path, stack: usize, function: Option<&str>, args: &[i32], reporter: &Reporter) -> CmdResult {
    let registry = host_registry()?;
    let (program, source) = compile_file(file, &registry)?;
    let located = |d: Diagnostic| Failure { diagnostics: vec![d], source: Some(source.clone()) };

    let address = match function {
        Some(name) => {
            let (Some(address), Some(arity)) = (program.function_address(name), program.function_arity(name)) else {
                return Err(Diagnostic::error(format!("no function named '{name}'")).into());
            };
            if arity != args.len() {
                return Err(Diagnostic::error(format!(
                    "function '{name}' takes {arity} arguments, {} given",
                    args.len()
                ))
                .into());
            }
            Some(address)
        }
        None => {
            if !args.is_empty() {
                return Err(Diagnostic::error("arguments need --function").into());
            }
            if program.function_arity("main").is_some_and(|n| n > 0) {
                reporter.emit(
                    Diagnostic::warning("'main' takes parameters, so it is not called at startup")
                        .with_suggestion("use --function main with arguments"),
                    None,
                );
            }
            None
        }
    };

    let mut vm = Vm::new(&program.bytecode, stack, &registry).map_err(|e| Diagnostic::from(&e))?;
    let result = match address {
        Some(a) => vm.run_function(a, args),
        None => vm.run_main(),
    };
    match result {
        Ok(v) => {
            println!("{}", fixed::format(v));
            Ok(())
        }
        Err(e) => {
            let mut d = Diagnostic::from(&e);
            if let Some(span) = program.span_for_pc(e.pc) {
                d = d.with_span(span, "here");
            }
            Err(located(d))
        }
    }
}

fn build(file: &Path, output: Option<PathBuf>) -> CmdResult {
    let registry = host_registry()?;
    let (program, _) = compile_file(file, &registry)?;
    let out = output.unwrap_or_else(|| file.with_extension("glc"));
    std::fs::write(&out, &program.bytecode)
        .map_err(|e| Diagnostic::error(format!("cannot write {}: {e}", out.display())))?;
    log::info!("wrote {} bytes to {}", program.bytecode.len(), out.display());
    Ok(())
}

fn exec(file: &Path, stack: usize) -> CmdResult {
    let registry = host_registry()?;
    let image = std::fs::read(file)
        .map_err(|e| Diagnostic::error(format!("cannot read {}: {e}", file.display())))?;
    let mut vm = Vm::new(&image, stack, &registry).map_err(|e| Diagnostic::from(&e))?;
    let v = vm.run_main().map_err(|e| Diagnostic::from(&e))?;
    println!("{}", fixed::format(v));
    Ok(())
}

fn dump(file: &Path, as_json: bool, listing: bool) -> CmdResult {
    let registry = host_registry()?;
    let (program, _) = compile_file(file, &registry)?;
    if as_json {
        let text = program
            .ast_json()
            .map_err(|e| Diagnostic::error(format!("cannot serialize tree: {e}")))?;
        println!("{text}");
    } else if listing {
        print!("{}", program.listing());
    } else {
        print!("{}", program.dump_ast());
    }
    Ok(())
}

fn explain(code: Option<&str>) -> CmdResult {
    match code {
        Some(code) => {
            let entry = registry::lookup(code)
                .ok_or_else(|| Diagnostic::error(format!("unknown error code '{code}'")))?;
            print!("{}", entry.long);
        }
        None => {
            for entry in registry::REGISTRY {
                println!("{}  {}", entry.code, entry.short);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let reporter = Reporter {
        format: cli.format,
        color: !cli.no_color && std::io::stderr().is_terminal(),
    };

    let result = match cli.cmd {
        Command::Run { file, stack, function, args } => run(&file, stack, function.as_deref(), &args, &reporter),
        Command::Build { file, output } => build(&file, output),
        Command::Exec { file, stack } => exec(&file, stack),
        Command::Dump { file, json, listing } => dump(&file, json, listing),
        Command::Explain { code } => explain(code.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            for d in failure.diagnostics {
                reporter.emit(d, failure.source.as_deref());
            }
            ExitCode::FAILURE
        }
    }
}

//! LoLa CLI: compile source files to modules, disassemble modules and
//! run programs with a minimal host environment.

use std::fs::File;
use std::path::Path;
use std::process;
use std::rc::Rc;

use lola::compiler::CompilationUnit;
use lola::runtime::{Environment, ExecutionResult, NativeFunction, Value, VirtualMachine};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Compile a source file into a module.
    Compile { source: String, output: Option<String> },
    /// Disassemble a compiled module.
    Disasm { module: String },
    /// Compile and run a source file.
    Run { source: String, trace: bool },
}

fn print_usage() {
    eprintln!("lola {} - LoLa compiler and virtual machine", VERSION);
    eprintln!();
    eprintln!("Usage: lola <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  compile <source> [-o <output>]   Compile the source file into a module");
    eprintln!("  disasm <module>                  Disassemble the given module");
    eprintln!("  run [-t] <source>                Compile and run the source file");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o <output>   Output file for compile (default: source with .lm)");
    eprintln!("  -t            Trace every executed instruction to stderr");
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args.first().map(String::as_str) {
        Some("compile") => {
            let mut source = None;
            let mut output = None;
            let mut rest = args[1..].iter();
            while let Some(arg) = rest.next() {
                if arg == "-o" {
                    output = Some(rest.next()?.clone());
                } else {
                    source = Some(arg.clone());
                }
            }
            Some(Command::Compile {
                source: source?,
                output,
            })
        }
        Some("disasm") => Some(Command::Disasm {
            module: args.get(1)?.clone(),
        }),
        Some("run") => {
            let mut source = None;
            let mut trace = false;
            for arg in &args[1..] {
                if arg == "-t" {
                    trace = true;
                } else {
                    source = Some(arg.clone());
                }
            }
            Some(Command::Run {
                source: source?,
                trace,
            })
        }
        _ => None,
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let Some(command) = parse_args(&args) else {
        print_usage();
        process::exit(1);
    };

    let code = match command {
        Command::Compile { source, output } => cmd_compile(&source, output.as_deref()),
        Command::Disasm { module } => cmd_disasm(&module),
        Command::Run { source, trace } => cmd_run(&source, trace),
    };
    process::exit(code);
}

fn compile_file(path: &str) -> Option<Rc<CompilationUnit>> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{}: {}", path, err);
            return None;
        }
    };
    match lola::compile_source_from(&source, path) {
        Ok(unit) => Some(unit),
        Err(err) => {
            eprintln!("{}", err);
            None
        }
    }
}

/// Derive the default module name: the source path with its extension
/// replaced by `.lm`.
fn default_output(source: &str) -> String {
    Path::new(source)
        .with_extension("lm")
        .to_string_lossy()
        .into_owned()
}

fn cmd_compile(source: &str, output: Option<&str>) -> i32 {
    let Some(unit) = compile_file(source) else {
        return 1;
    };

    let output = output
        .map(str::to_string)
        .unwrap_or_else(|| default_output(source));

    let result = File::create(&output).and_then(|mut file| unit.save(&mut file));
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{}: {}", output, err);
            1
        }
    }
}

fn cmd_disasm(module: &str) -> i32 {
    let unit = File::open(module)
        .map_err(lola::error::ModuleError::from)
        .and_then(|mut file| CompilationUnit::load(&mut file));
    let unit = match unit {
        Ok(unit) => Rc::new(unit),
        Err(err) => {
            eprintln!("{}: {}", module, err);
            return 1;
        }
    };

    match lola::compiler::disassemble(&unit) {
        Ok(listing) => {
            print!("{}", listing);
            0
        }
        Err(err) => {
            eprintln!("{}: {}", module, err);
            1
        }
    }
}

fn cmd_run(source: &str, trace: bool) -> i32 {
    let Some(unit) = compile_file(source) else {
        return 1;
    };

    let env = Environment::new(unit);
    env.borrow_mut().register(
        "Print",
        Rc::new(NativeFunction::new("Print", |args| {
            let line = args
                .iter()
                .map(|value| value.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}", line);
            Ok(Value::Void)
        })),
    );

    let mut vm = VirtualMachine::new(env);
    vm.enable_trace = trace;

    loop {
        match vm.exec() {
            Ok(ExecutionResult::Done) => return 0,
            Ok(ExecutionResult::Exhausted) | Ok(ExecutionResult::Paused) => continue,
            Err(err) => {
                eprintln!("{}", err);
                return 1;
            }
        }
    }
}

//! LoLa: an embeddable scripting language.
//!
//! Source text is translated to a compact stack-based bytecode, then
//! executed by a virtual machine that cooperates with the host program
//! through registered functions, globals and object methods. The host
//! retains control over scheduling: execution happens in bounded steps
//! driven by [`runtime::VirtualMachine::exec`].
//!
//! ```no_run
//! use std::rc::Rc;
//! use lola::runtime::{Environment, NativeFunction, Value, VirtualMachine, ExecutionResult};
//!
//! let unit = lola::compile_source("Print(\"hello\");").unwrap();
//! let env = Environment::new(unit);
//! env.borrow_mut().register(
//!     "Print",
//!     Rc::new(NativeFunction::new("Print", |args| {
//!         for arg in args {
//!             println!("{}", arg);
//!         }
//!         Ok(Value::Void)
//!     })),
//! );
//!
//! let mut vm = VirtualMachine::new(env);
//! while vm.exec().unwrap() != ExecutionResult::Done {}
//! ```

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod span;

use std::rc::Rc;

use compiler::CompilationUnit;
use error::{Diagnostics, LolaError};

/// Parse source code into an AST without translating it.
pub fn parse(source: &str) -> Result<ast::Program, LolaError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code into a compilation unit.
pub fn compile_source(source: &str) -> Result<Rc<CompilationUnit>, LolaError> {
    compile_source_from(source, "<source>")
}

/// Compile source code, attributing diagnostics to `file`.
pub fn compile_source_from(source: &str, file: &str) -> Result<Rc<CompilationUnit>, LolaError> {
    let program = parse(source)?;
    let mut diagnostics = Diagnostics::with_file(file);
    match compiler::compile(&program, &mut diagnostics) {
        Some(unit) => Ok(unit),
        None => Err(LolaError::Compile(diagnostics)),
    }
}

//! Translation from the syntax tree to bytecode, the bytecode itself,
//! and the serialized module format.

pub mod codegen;
pub mod disassembler;
pub mod opcode;
pub mod reader;
pub mod scope;
pub mod unit;
pub mod writer;

pub use codegen::compile;
pub use disassembler::disassemble;
pub use opcode::Opcode;
pub use reader::CodeReader;
pub use scope::{Scope, Slot};
pub use unit::{CompilationUnit, FunctionInfo};
pub use writer::{CodeWriter, Label};

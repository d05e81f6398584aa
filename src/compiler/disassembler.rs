//! Human-readable bytecode listings.

use std::fmt::Write;
use std::rc::Rc;

use crate::error::RuntimeError;

use super::opcode::Opcode;
use super::reader::CodeReader;
use super::unit::CompilationUnit;

/// Disassemble a whole compilation unit. Each line carries the hex
/// offset of the instruction; function entry points are labelled.
pub fn disassemble(unit: &Rc<CompilationUnit>) -> Result<String, RuntimeError> {
    let mut out = String::new();
    let mut reader = CodeReader::new(unit.clone(), 0);

    let _ = writeln!(out, "{:06X}\t<main>:", reader.offset);
    while !reader.at_end() {
        for (name, info) in &unit.functions {
            if info.entry_point as usize == reader.offset {
                let _ = writeln!(out, "{:06X}\t{}:", reader.offset, name);
                break;
            }
        }

        let offset = reader.offset;
        let text = disassemble_instruction(&mut reader)?;
        let _ = writeln!(out, "{:06X}\t\t{}", offset, text);
    }

    Ok(out)
}

/// Disassemble the instruction at the reader's current offset.
pub fn disassemble_instruction(reader: &mut CodeReader) -> Result<String, RuntimeError> {
    let op = reader.fetch_instruction()?;
    let text = match op {
        Opcode::Nop
        | Opcode::Pop
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::And
        | Opcode::Or
        | Opcode::Not
        | Opcode::Negate
        | Opcode::Eq
        | Opcode::Neq
        | Opcode::LessEq
        | Opcode::GreaterEq
        | Opcode::Less
        | Opcode::Greater
        | Opcode::IterMake
        | Opcode::IterNext
        | Opcode::ArrayStore
        | Opcode::ArrayLoad
        | Opcode::Ret
        | Opcode::RetVal
        | Opcode::PushTrue
        | Opcode::PushFalse
        | Opcode::PushVoid => op.mnemonic().to_string(),

        Opcode::StoreGlobalName | Opcode::LoadGlobalName => {
            format!("{} {}", op.mnemonic(), reader.fetch_string()?)
        }
        Opcode::PushStr => format!("{} '{}'", op.mnemonic(), reader.fetch_string()?),
        Opcode::PushNum => format!("{} {}", op.mnemonic(), reader.fetch_number()?),
        Opcode::ArrayPack => format!("{} {}", op.mnemonic(), reader.fetch_u16()?),
        Opcode::CallFn | Opcode::CallObj => {
            let name = reader.fetch_string()?;
            let argc = reader.fetch_u8()?;
            format!("{} {}, {}", op.mnemonic(), name, argc)
        }
        Opcode::Jmp | Opcode::Jnf | Opcode::Jif => {
            format!("{} {:06X}", op.mnemonic(), reader.fetch_u32()?)
        }
        Opcode::StoreLocal
        | Opcode::LoadLocal
        | Opcode::StoreGlobalIdx
        | Opcode::LoadGlobalIdx => format!("{} {}", op.mnemonic(), reader.fetch_u16()?),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn listing(source: &str) -> String {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut diagnostics = Diagnostics::new();
        let unit = crate::compiler::compile(&program, &mut diagnostics).unwrap();
        disassemble(&unit).unwrap()
    }

    #[test]
    fn lists_main_and_functions() {
        let text = listing("var a = 1; function F() { return; }");
        assert!(text.starts_with("000000\t<main>:"));
        assert!(text.contains("F:"));
        assert!(text.contains("push_num 1"));
        assert!(text.contains("store_global 0"));
    }

    #[test]
    fn lists_calls_with_arity() {
        let text = listing("Print(\"hi\", 2);");
        assert!(text.contains("push_str 'hi'"));
        assert!(text.contains("call_fn Print, 2"));
    }

    #[test]
    fn truncated_code_reports_invalid_pointer() {
        let unit = Rc::new(CompilationUnit {
            code: vec![Opcode::PushNum as u8, 1, 2],
            ..Default::default()
        });
        assert_eq!(disassemble(&unit), Err(RuntimeError::InvalidPointer));
    }
}

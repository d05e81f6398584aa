//! The compilation unit and its serialized module format.
//!
//! A module file is little endian throughout:
//!
//! | Offset | Size  | Field                                  |
//! |--------|-------|----------------------------------------|
//! | 0      | 8     | Magic `4C 6F 4C 61 B9 40 80 5A`        |
//! | 8      | 4     | Format version (1)                     |
//! | 12     | 256   | Comment, NUL padded                    |
//! | 268    | 2     | global_count                           |
//! | 270    | 2     | temporary_count                        |
//! | 272    | 2     | function_count                         |
//! | 274    | 4     | code_size                              |
//! | 278    | 4     | debug_symbol_count                     |
//! | 282    | 134×n | Function table                         |
//! | …      | …     | Code bytes                             |
//!
//! Each function table entry is a 128-byte NUL-padded name, a u32 entry
//! point and a u16 local count.

use std::io::{Read, Write};

use indexmap::IndexMap;

use crate::error::ModuleError;

/// Magic bytes: "LoLa" plus a sentinel.
const MAGIC: [u8; 8] = [0x4C, 0x6F, 0x4C, 0x61, 0xB9, 0x40, 0x80, 0x5A];

/// Current module format version.
const VERSION: u32 = 1;

/// Size of a NUL-padded function name in the function table.
const FUNCTION_NAME_SIZE: usize = 128;

/// Size of the NUL-padded comment field.
const COMMENT_SIZE: usize = 256;

/// A script function's location within the compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    /// Byte offset of the function's first instruction.
    pub entry_point: u32,
    /// Number of local slots (parameters included).
    pub local_count: u16,
}

/// A piece of compiled LoLa code. Immutable after translation; shared by
/// any number of environments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompilationUnit {
    /// Number of indexed global slots.
    pub global_count: u16,
    /// Number of temporary slots needed by the top-level frame.
    pub temporary_count: u16,
    /// The bytecode.
    pub code: Vec<u8>,
    /// Script functions by name, in declaration order.
    pub functions: IndexMap<String, FunctionInfo>,
}

impl CompilationUnit {
    /// Serialize the unit in the module file format.
    pub fn save<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
        sink.write_all(&MAGIC)?;
        sink.write_all(&VERSION.to_le_bytes())?;

        let mut comment = [0u8; COMMENT_SIZE];
        let text = b"Created with the LoLa compiler";
        comment[..text.len()].copy_from_slice(text);
        sink.write_all(&comment)?;

        sink.write_all(&self.global_count.to_le_bytes())?;
        sink.write_all(&self.temporary_count.to_le_bytes())?;
        sink.write_all(&(self.functions.len() as u16).to_le_bytes())?;
        sink.write_all(&(self.code.len() as u32).to_le_bytes())?;
        sink.write_all(&0u32.to_le_bytes())?; // debug symbols

        for (name, info) in &self.functions {
            let mut padded = [0u8; FUNCTION_NAME_SIZE];
            let len = name.len().min(FUNCTION_NAME_SIZE - 1);
            padded[..len].copy_from_slice(&name.as_bytes()[..len]);
            sink.write_all(&padded)?;
            sink.write_all(&info.entry_point.to_le_bytes())?;
            sink.write_all(&info.local_count.to_le_bytes())?;
        }

        sink.write_all(&self.code)?;
        Ok(())
    }

    /// Deserialize a unit from the module file format.
    pub fn load<R: Read>(source: &mut R) -> Result<CompilationUnit, ModuleError> {
        let mut magic = [0u8; 8];
        source.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic);
        }

        let version = read_u32(source)?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let mut comment = [0u8; COMMENT_SIZE];
        source.read_exact(&mut comment)?;

        let global_count = read_u16(source)?;
        let temporary_count = read_u16(source)?;
        let function_count = read_u16(source)?;
        let code_size = read_u32(source)?;
        let debug_symbol_count = read_u32(source)?;
        if debug_symbol_count != 0 {
            return Err(ModuleError::DebugSymbolsUnsupported);
        }

        let mut functions = IndexMap::with_capacity(function_count as usize);
        for _ in 0..function_count {
            let mut padded = [0u8; FUNCTION_NAME_SIZE];
            source.read_exact(&mut padded)?;
            let len = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
            let name = std::str::from_utf8(&padded[..len])
                .map_err(|_| ModuleError::Malformed("function name is not valid UTF-8"))?
                .to_string();

            let entry_point = read_u32(source)?;
            let local_count = read_u16(source)?;
            if entry_point > code_size {
                return Err(ModuleError::Malformed("function entry point out of range"));
            }
            functions.insert(
                name,
                FunctionInfo {
                    entry_point,
                    local_count,
                },
            );
        }

        let mut code = vec![0u8; code_size as usize];
        source.read_exact(&mut code)?;

        Ok(CompilationUnit {
            global_count,
            temporary_count,
            code,
            functions,
        })
    }
}

fn read_u16<R: Read>(source: &mut R) -> Result<u16, ModuleError> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(source: &mut R) -> Result<u32, ModuleError> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

//! Sequential reader over a compilation unit's code bytes.

use std::rc::Rc;

use crate::error::RuntimeError;

use super::opcode::Opcode;
use super::unit::CompilationUnit;

/// A cursor into a compilation unit's code. Every fetch advances the
/// offset; reading past the end of the code is an `InvalidPointer`.
#[derive(Debug, Clone)]
pub struct CodeReader {
    pub unit: Rc<CompilationUnit>,
    pub offset: usize,
}

impl CodeReader {
    pub fn new(unit: Rc<CompilationUnit>, offset: usize) -> Self {
        Self { unit, offset }
    }

    pub fn at_end(&self) -> bool {
        self.offset >= self.unit.code.len()
    }

    fn fetch_bytes(&mut self, len: usize) -> Result<&[u8], RuntimeError> {
        let code = &self.unit.code;
        if self.offset + len > code.len() {
            return Err(RuntimeError::InvalidPointer);
        }
        let bytes = &code[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Fetch and decode one opcode byte.
    pub fn fetch_instruction(&mut self) -> Result<Opcode, RuntimeError> {
        let byte = self.fetch_u8()?;
        Opcode::from_byte(byte).ok_or(RuntimeError::InvalidInstruction)
    }

    pub fn fetch_u8(&mut self) -> Result<u8, RuntimeError> {
        Ok(self.fetch_bytes(1)?[0])
    }

    pub fn fetch_u16(&mut self) -> Result<u16, RuntimeError> {
        let bytes = self.fetch_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn fetch_u32(&mut self) -> Result<u32, RuntimeError> {
        let bytes = self.fetch_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn fetch_number(&mut self) -> Result<f64, RuntimeError> {
        let bytes = self.fetch_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    /// Fetch a string immediate: u16 length plus raw bytes.
    pub fn fetch_string(&mut self) -> Result<String, RuntimeError> {
        let len = self.fetch_u16()? as usize;
        let bytes = self.fetch_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Move the cursor to an absolute offset, validating the jump target.
    pub fn jump(&mut self, target: u32) -> Result<(), RuntimeError> {
        if target as usize >= self.unit.code.len() {
            return Err(RuntimeError::InvalidPointer);
        }
        self.offset = target as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(code: Vec<u8>) -> CodeReader {
        CodeReader::new(
            Rc::new(CompilationUnit {
                code,
                ..Default::default()
            }),
            0,
        )
    }

    #[test]
    fn fetches_immediates_little_endian() {
        let mut reader = reader_over(vec![0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.fetch_u16().unwrap(), 0x1234);
        assert_eq!(reader.fetch_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn fetches_strings() {
        let mut code = vec![2, 0];
        code.extend_from_slice(b"hi");
        let mut reader = reader_over(code);
        assert_eq!(reader.fetch_string().unwrap(), "hi");
    }

    #[test]
    fn read_past_end_is_invalid_pointer() {
        let mut reader = reader_over(vec![1]);
        assert_eq!(reader.fetch_u16(), Err(RuntimeError::InvalidPointer));
    }

    #[test]
    fn unknown_opcode_is_invalid_instruction() {
        let mut reader = reader_over(vec![2]);
        assert_eq!(
            reader.fetch_instruction(),
            Err(RuntimeError::InvalidInstruction)
        );
    }

    #[test]
    fn jump_to_code_length_is_invalid() {
        let mut reader = reader_over(vec![0, 0]);
        assert_eq!(reader.jump(2), Err(RuntimeError::InvalidPointer));
        assert!(reader.jump(1).is_ok());
        assert_eq!(reader.offset, 1);
    }
}

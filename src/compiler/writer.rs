//! Append-only bytecode writer with forward-patched jump labels.

use std::collections::HashMap;

use crate::error::Diagnostics;
use crate::span::Span;

use super::opcode::Opcode;

/// Placeholder written for a label reference that is not yet defined.
const UNRESOLVED: u32 = u32::MAX;

/// An opaque jump target. Labels may be referenced before they are
/// defined; references are patched once the target offset is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// The break/continue targets of a loop currently being translated.
#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    break_label: Label,
    continue_label: Label,
}

/// Writes instructions and immediates into a code buffer, keeping track
/// of labels, unresolved forward references and active loops.
pub struct CodeWriter {
    code: Vec<u8>,
    next_label: u32,
    labels: HashMap<Label, u32>,
    patches: Vec<(Label, usize)>,
    loops: Vec<LoopLabels>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            next_label: 1,
            labels: HashMap::new(),
            patches: Vec::new(),
            loops: Vec::new(),
        }
    }

    /// The offset the next emitted byte will land on.
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Create a new, undefined label.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Set the label's target to the current offset and resolve all
    /// pending forward references to it. Defining a label twice records
    /// a diagnostic.
    pub fn define_label(&mut self, label: Label, span: Span, diagnostics: &mut Diagnostics) {
        if self.labels.contains_key(&label) {
            diagnostics.label_already_defined(span);
            return;
        }

        let position = self.offset();
        self.labels.insert(label, position);

        let code = &mut self.code;
        self.patches.retain(|&(pending, at)| {
            if pending == label {
                code[at..at + 4].copy_from_slice(&position.to_le_bytes());
                false
            } else {
                true
            }
        });
    }

    /// Create a label that targets the current offset.
    pub fn create_and_define_label(&mut self, span: Span, diagnostics: &mut Diagnostics) -> Label {
        let label = self.create_label();
        self.define_label(label, span, diagnostics);
        label
    }

    /// Emit a 4-byte label reference. If the target is still unknown, a
    /// placeholder is written and recorded for patching.
    pub fn emit_label(&mut self, label: Label) {
        if let Some(&position) = self.labels.get(&label) {
            self.emit_u32(position);
        } else {
            self.patches.push((label, self.code.len()));
            self.emit_u32(UNRESOLVED);
        }
    }

    pub fn emit_op(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.code.push(value);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_f64(&mut self, value: f64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a string immediate: u16 length followed by the raw bytes.
    pub fn emit_str(&mut self, value: &str) {
        debug_assert!(value.len() < 65536);
        self.emit_u16(value.len() as u16);
        self.code.extend_from_slice(value.as_bytes());
    }

    // --- Loop tracking ---

    /// Enter a loop: `break` jumps to `break_label`, `continue` to
    /// `continue_label`.
    pub fn push_loop(&mut self, break_label: Label, continue_label: Label) {
        self.loops.push(LoopLabels {
            break_label,
            continue_label,
        });
    }

    pub fn pop_loop(&mut self) {
        debug_assert!(!self.loops.is_empty());
        self.loops.pop();
    }

    pub fn emit_break(&mut self, span: Span, diagnostics: &mut Diagnostics) {
        match self.loops.last().copied() {
            Some(active) => {
                self.emit_op(Opcode::Jmp);
                self.emit_label(active.break_label);
            }
            None => diagnostics.not_in_loop(span),
        }
    }

    pub fn emit_continue(&mut self, span: Span, diagnostics: &mut Diagnostics) {
        match self.loops.last().copied() {
            Some(active) => {
                self.emit_op(Opcode::Jmp);
                self.emit_label(active.continue_label);
            }
            None => diagnostics.not_in_loop(span),
        }
    }

    /// Number of unresolved forward references. Zero once translation of
    /// a well-formed program has finished.
    pub fn pending_patches(&self) -> usize {
        self.patches.len()
    }

    /// Consume the writer, yielding the code buffer.
    pub fn into_code(self) -> Vec<u8> {
        debug_assert!(self.patches.is_empty(), "unresolved forward references");
        self.code
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reference_is_patched() {
        let mut diagnostics = Diagnostics::new();
        let mut writer = CodeWriter::new();

        let target = writer.create_label();
        writer.emit_op(Opcode::Jmp);
        writer.emit_label(target);
        assert_eq!(writer.pending_patches(), 1);

        writer.emit_op(Opcode::Nop);
        writer.define_label(target, Span::default(), &mut diagnostics);
        assert_eq!(writer.pending_patches(), 0);

        let code = writer.into_code();
        // jmp (1 byte) + target (4 bytes) + nop; the label points past the nop.
        assert_eq!(&code[1..5], &6u32.to_le_bytes());
    }

    #[test]
    fn backward_reference_needs_no_patch() {
        let mut diagnostics = Diagnostics::new();
        let mut writer = CodeWriter::new();

        writer.emit_op(Opcode::Nop);
        let target = writer.create_and_define_label(Span::default(), &mut diagnostics);
        writer.emit_op(Opcode::Jmp);
        writer.emit_label(target);
        assert_eq!(writer.pending_patches(), 0);

        let code = writer.into_code();
        assert_eq!(&code[2..6], &1u32.to_le_bytes());
    }

    #[test]
    fn redefining_a_label_is_reported() {
        let mut diagnostics = Diagnostics::new();
        let mut writer = CodeWriter::new();

        let label = writer.create_label();
        writer.define_label(label, Span::default(), &mut diagnostics);
        writer.define_label(label, Span::default(), &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let mut diagnostics = Diagnostics::new();
        let mut writer = CodeWriter::new();

        writer.emit_break(Span::default(), &mut diagnostics);
        writer.emit_continue(Span::default(), &mut diagnostics);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == crate::error::DiagnosticKind::NotInLoop));
    }

    #[test]
    fn break_inside_loop_jumps_to_break_label() {
        let mut diagnostics = Diagnostics::new();
        let mut writer = CodeWriter::new();

        let break_label = writer.create_label();
        let continue_label = writer.create_and_define_label(Span::default(), &mut diagnostics);
        writer.push_loop(break_label, continue_label);
        writer.emit_break(Span::default(), &mut diagnostics);
        writer.pop_loop();
        writer.define_label(break_label, Span::default(), &mut diagnostics);

        assert!(diagnostics.is_empty());
        let code = writer.into_code();
        assert_eq!(code[0], Opcode::Jmp as u8);
        assert_eq!(&code[1..5], &5u32.to_le_bytes());
    }

    #[test]
    fn little_endian_immediates() {
        let mut writer = CodeWriter::new();
        writer.emit_u16(0x1234);
        writer.emit_u32(0x5678_9ABC);
        let code = writer.into_code();
        assert_eq!(code, vec![0x34, 0x12, 0xBC, 0x9A, 0x78, 0x56]);
    }
}

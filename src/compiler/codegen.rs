//! AST-to-bytecode translation.
//!
//! Single pass: walks the syntax tree once, emitting instructions through
//! the code writer while the scope resolver assigns variable slots.
//! Problems do not abort translation; they are recorded as diagnostics
//! and the compilation unit is withheld at the end if any were recorded.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::error::Diagnostics;

use super::opcode::Opcode;
use super::scope::{Scope, Slot};
use super::unit::{CompilationUnit, FunctionInfo};
use super::writer::CodeWriter;

/// Names that may be read as literals but never declared or assigned.
fn is_reserved_name(name: &str) -> bool {
    name == "true" || name == "false" || name == "void"
}

/// Translate a program into a compilation unit.
///
/// Top-level statements form the main program, starting at offset zero;
/// function bodies follow. An implicit `ret` is appended after the
/// top-level statements and after each function body. Returns `None` if
/// any diagnostic was recorded.
pub fn compile(program: &Program, diagnostics: &mut Diagnostics) -> Option<Rc<CompilationUnit>> {
    let mut codegen = Codegen {
        writer: CodeWriter::new(),
        diagnostics: &mut *diagnostics,
    };

    let mut global_scope = Scope::global_root();
    for stmt in &program.statements {
        codegen.stmt(stmt, &mut global_scope);
    }
    codegen.writer.emit_op(Opcode::Ret);

    let mut functions = IndexMap::new();
    for func in &program.functions {
        let entry_point = codegen.writer.offset();

        let mut scope = Scope::function_scope(&global_scope);
        for param in &func.params {
            scope.declare(param);
        }

        codegen.stmt(&func.body, &mut scope);
        codegen.writer.emit_op(Opcode::Ret);

        functions.insert(
            func.name.clone(),
            FunctionInfo {
                entry_point,
                local_count: scope.max_locals(),
            },
        );
    }

    let Codegen { writer, .. } = codegen;
    debug_assert_eq!(writer.pending_patches(), 0);

    let unit = CompilationUnit {
        global_count: global_scope.global_count(),
        temporary_count: global_scope.max_locals(),
        code: writer.into_code(),
        functions,
    };

    if diagnostics.is_empty() {
        Some(Rc::new(unit))
    } else {
        None
    }
}

struct Codegen<'d> {
    writer: CodeWriter,
    diagnostics: &'d mut Diagnostics,
}

impl Codegen<'_> {
    fn stmt(&mut self, stmt: &Stmt, scope: &mut Scope) {
        match &stmt.kind {
            StmtKind::Declaration { name, initializer } => {
                if is_reserved_name(name) {
                    self.diagnostics.invalid_variable(name, stmt.span);
                    return;
                }
                scope.declare(name);
                if let Some(init) = initializer {
                    self.expr(init, scope);
                    let slot = scope.get(name).expect("freshly declared name resolves");
                    self.store_slot(slot, name);
                }
            }

            StmtKind::ExternDeclaration { name } => {
                if is_reserved_name(name) {
                    self.diagnostics.invalid_variable(name, stmt.span);
                } else {
                    scope.declare_extern(name);
                }
            }

            StmtKind::Assignment { target, op, value } => {
                match op {
                    // Compound assignment reuses the target: it is cloned
                    // into the left side of the combining operator.
                    Some(op) => {
                        let combined = Expr::new(
                            ExprKind::Binary {
                                op: *op,
                                lhs: Box::new(target.clone()),
                                rhs: Box::new(value.clone()),
                            },
                            value.span,
                        );
                        self.expr(&combined, scope);
                    }
                    None => self.expr(value, scope),
                }
                self.store(target, scope);
            }

            StmtKind::Expression(expr) => {
                self.expr(expr, scope);
                self.writer.emit_op(Opcode::Pop);
            }

            StmtKind::Return(None) => {
                self.writer.emit_op(Opcode::Ret);
            }
            StmtKind::Return(Some(value)) => {
                self.expr(value, scope);
                self.writer.emit_op(Opcode::RetVal);
            }

            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition, scope);
                match else_body {
                    None => {
                        let end = self.writer.create_label();
                        self.writer.emit_op(Opcode::Jif);
                        self.writer.emit_label(end);
                        self.stmt(then_body, scope);
                        self.writer.define_label(end, stmt.span, self.diagnostics);
                    }
                    Some(else_body) => {
                        let false_branch = self.writer.create_label();
                        let end = self.writer.create_label();
                        self.writer.emit_op(Opcode::Jif);
                        self.writer.emit_label(false_branch);
                        self.stmt(then_body, scope);
                        self.writer.emit_op(Opcode::Jmp);
                        self.writer.emit_label(end);
                        self.writer
                            .define_label(false_branch, stmt.span, self.diagnostics);
                        self.stmt(else_body, scope);
                        self.writer.define_label(end, stmt.span, self.diagnostics);
                    }
                }
            }

            StmtKind::While { condition, body } => {
                let start = self
                    .writer
                    .create_and_define_label(stmt.span, self.diagnostics);
                let end = self.writer.create_label();

                self.writer.push_loop(end, start);

                self.expr(condition, scope);
                self.writer.emit_op(Opcode::Jif);
                self.writer.emit_label(end);

                self.stmt(body, scope);

                self.writer.emit_op(Opcode::Jmp);
                self.writer.emit_label(start);

                self.writer.define_label(end, stmt.span, self.diagnostics);
                self.writer.pop_loop();
            }

            StmtKind::For {
                variable,
                iterable,
                body,
            } => {
                scope.enter();

                self.expr(iterable, scope);
                self.writer.emit_op(Opcode::IterMake);

                scope.declare(variable);
                let slot = scope.get(variable).expect("loop variable resolves");

                let start = self
                    .writer
                    .create_and_define_label(stmt.span, self.diagnostics);
                let end = self.writer.create_label();

                self.writer.push_loop(end, start);

                self.writer.emit_op(Opcode::IterNext);
                self.writer.emit_op(Opcode::Jif);
                self.writer.emit_label(end);

                self.store_slot(slot, variable);

                self.stmt(body, scope);

                self.writer.emit_op(Opcode::Jmp);
                self.writer.emit_label(start);

                self.writer.define_label(end, stmt.span, self.diagnostics);
                self.writer.pop_loop();

                // Erase the enumerator from the stack.
                self.writer.emit_op(Opcode::Pop);

                scope.leave();
            }

            StmtKind::Break => self.writer.emit_break(stmt.span, self.diagnostics),
            StmtKind::Continue => self.writer.emit_continue(stmt.span, self.diagnostics),

            StmtKind::Block(statements) => {
                scope.enter();
                for inner in statements {
                    self.stmt(inner, scope);
                }
                scope.leave();
            }
        }
    }

    /// Emit an expression as an rvalue.
    fn expr(&mut self, expr: &Expr, scope: &mut Scope) {
        match &expr.kind {
            ExprKind::Number(value) => {
                self.writer.emit_op(Opcode::PushNum);
                self.writer.emit_f64(*value);
            }

            ExprKind::String(raw) => {
                self.writer.emit_op(Opcode::PushStr);
                match resolve_escapes(raw) {
                    Some(text) => self.writer.emit_str(&text),
                    None => {
                        self.diagnostics.invalid_string(raw, expr.span);
                        self.writer.emit_str(raw);
                    }
                }
            }

            ExprKind::Variable(name) => match name.as_str() {
                "true" => self.writer.emit_op(Opcode::PushTrue),
                "false" => self.writer.emit_op(Opcode::PushFalse),
                "void" => self.writer.emit_op(Opcode::PushVoid),
                _ => match scope.get(name) {
                    Some(slot) => self.load_slot(slot, name),
                    None => self.diagnostics.variable_not_found(name, expr.span),
                },
            },

            ExprKind::Array(elements) => {
                debug_assert!(elements.len() < 65536);
                // Elements are emitted in reverse so that after packing,
                // element 0 is the first element in source order.
                for element in elements.iter().rev() {
                    self.expr(element, scope);
                }
                self.writer.emit_op(Opcode::ArrayPack);
                self.writer.emit_u16(elements.len() as u16);
            }

            ExprKind::Index { array, index } => {
                self.expr(index, scope);
                self.expr(array, scope);
                self.writer.emit_op(Opcode::ArrayLoad);
            }

            ExprKind::Call { name, args } => {
                debug_assert!(args.len() < 256);
                for arg in args.iter().rev() {
                    self.expr(arg, scope);
                }
                self.writer.emit_op(Opcode::CallFn);
                self.writer.emit_str(name);
                self.writer.emit_u8(args.len() as u8);
            }

            ExprKind::MethodCall { object, name, args } => {
                debug_assert!(args.len() < 256);
                for arg in args.iter().rev() {
                    self.expr(arg, scope);
                }
                self.expr(object, scope);
                self.writer.emit_op(Opcode::CallObj);
                self.writer.emit_str(name);
                self.writer.emit_u8(args.len() as u8);
            }

            ExprKind::Unary { op, operand } => {
                self.expr(operand, scope);
                match op {
                    UnaryOp::Minus => self.writer.emit_op(Opcode::Negate),
                    UnaryOp::Not => self.writer.emit_op(Opcode::Not),
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs, scope);
                self.expr(rhs, scope);
                self.writer.emit_op(match op {
                    BinaryOp::Add => Opcode::Add,
                    BinaryOp::Subtract => Opcode::Sub,
                    BinaryOp::Multiply => Opcode::Mul,
                    BinaryOp::Divide => Opcode::Div,
                    BinaryOp::Modulo => Opcode::Mod,
                    BinaryOp::Equals => Opcode::Eq,
                    BinaryOp::Differs => Opcode::Neq,
                    BinaryOp::Less => Opcode::Less,
                    BinaryOp::LessEqual => Opcode::LessEq,
                    BinaryOp::Greater => Opcode::Greater,
                    BinaryOp::GreaterEqual => Opcode::GreaterEq,
                    BinaryOp::And => Opcode::And,
                    BinaryOp::Or => Opcode::Or,
                });
            }
        }
    }

    /// Emit the store path of an assignment target. The value to store
    /// is already on the stack.
    fn store(&mut self, target: &Expr, scope: &mut Scope) {
        match &target.kind {
            ExprKind::Variable(name) => {
                if is_reserved_name(name) {
                    self.diagnostics.invalid_store(name, target.span);
                    return;
                }
                match scope.get(name) {
                    Some(slot) => self.store_slot(slot, name),
                    None => self.diagnostics.variable_not_found(name, target.span),
                }
            }

            ExprKind::Index { array, index } => {
                if !array.is_lvalue() {
                    self.diagnostics.invalid_operator("=", target.span);
                    return;
                }
                // Read-modify-write: load index and array, store the
                // element, then write the updated array back through the
                // underlying target. Nested indices chain naturally.
                self.expr(index, scope);
                self.expr(array, scope);
                self.writer.emit_op(Opcode::ArrayStore);
                self.store(array, scope);
            }

            _ => self.diagnostics.invalid_operator("=", target.span),
        }
    }

    fn load_slot(&mut self, slot: Slot, name: &str) {
        match slot {
            Slot::Local(index) => {
                self.writer.emit_op(Opcode::LoadLocal);
                self.writer.emit_u16(index);
            }
            Slot::Global(index) => {
                self.writer.emit_op(Opcode::LoadGlobalIdx);
                self.writer.emit_u16(index);
            }
            Slot::Extern => {
                self.writer.emit_op(Opcode::LoadGlobalName);
                self.writer.emit_str(name);
            }
        }
    }

    fn store_slot(&mut self, slot: Slot, name: &str) {
        match slot {
            Slot::Local(index) => {
                self.writer.emit_op(Opcode::StoreLocal);
                self.writer.emit_u16(index);
            }
            Slot::Global(index) => {
                self.writer.emit_op(Opcode::StoreGlobalIdx);
                self.writer.emit_u16(index);
            }
            Slot::Extern => {
                self.writer.emit_op(Opcode::StoreGlobalName);
                self.writer.emit_str(name);
            }
        }
    }
}

/// Resolve escape sequences in a string literal body. Supported escapes:
/// `\n`, `\t`, `\r`, `\"`, `\'`, `\\` and `\xHH` (two hex digits, ASCII
/// range). Returns `None` on any unknown or malformed sequence.
fn resolve_escapes(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '\\' => out.push('\\'),
            'x' => {
                let hi = chars.next()?.to_digit(16)?;
                let lo = chars.next()?.to_digit(16)?;
                let byte = (hi * 16 + lo) as u8;
                if byte > 0x7F {
                    return None;
                }
                out.push(byte as char);
            }
            _ => return None,
        }
    }

    Some(out)
}

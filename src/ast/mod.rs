//! Abstract syntax tree for LoLa programs.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use stmt::{FunctionDecl, Program, Stmt, StmtKind};

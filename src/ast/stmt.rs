//! Statement AST nodes.

use crate::ast::expr::{BinaryOp, Expr};
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Variable declaration: `var x;` or `var x = expr;`
    Declaration {
        name: String,
        initializer: Option<Expr>,
    },

    /// Extern declaration: `extern x;` — binds `x` to a host-provided
    /// named global, resolved by name at runtime.
    ExternDeclaration { name: String },

    /// Assignment: `target = value;` or compound `target op= value;`.
    /// For compound forms `op` carries the operator; the translator
    /// rewrites them as `target = target op value` by cloning the target.
    Assignment {
        target: Expr,
        op: Option<BinaryOp>,
        value: Expr,
    },

    /// Expression statement; the result is discarded.
    Expression(Expr),

    /// `return;` or `return expr;`
    Return(Option<Expr>),

    /// `if (cond) stmt` with optional `else stmt`
    If {
        condition: Expr,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },

    /// `while (cond) stmt`
    While { condition: Expr, body: Box<Stmt> },

    /// `for (name in expr) stmt`
    For {
        variable: String,
        iterable: Expr,
        body: Box<Stmt>,
    },

    /// `break;`
    Break,

    /// `continue;`
    Continue,

    /// `{ stmt* }`
    Block(Vec<Stmt>),
}

/// A function declaration. Functions only appear at the top level.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Stmt,
    pub span: Span,
}

/// A parsed program: top-level statements plus function declarations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub functions: Vec<FunctionDecl>,
}

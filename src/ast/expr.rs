//! Expression AST nodes.
//!
//! Every node is plain data and derives `Clone`: compound assignments are
//! desugared by duplicating the assignment target, so expressions must be
//! structurally cloneable.

use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether this expression can be the target of an assignment.
    pub fn is_lvalue(&self) -> bool {
        matches!(self.kind, ExprKind::Variable(_) | ExprKind::Index { .. })
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Number literal: 3.14
    Number(f64),

    /// String literal: "hello". The body is kept raw; escape sequences
    /// are resolved during translation.
    String(String),

    /// Variable reference: foo. The reserved names `true`, `false` and
    /// `void` also arrive here and are special-cased by the translator.
    Variable(String),

    /// Array literal: [1, 2, 3]
    Array(Vec<Expr>),

    /// Array index: arr[index]
    Index { array: Box<Expr>, index: Box<Expr> },

    /// Function call: Foo(a, b)
    Call { name: String, args: Vec<Expr> },

    /// Method call on an object: obj.Foo(a, b)
    MethodCall {
        object: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },

    /// Unary operation: -x, not x
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Binary operation: a + b
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation: -x
    Minus,
    /// Logical inversion: not x
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    Differs,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equals => "==",
            BinaryOp::Differs => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

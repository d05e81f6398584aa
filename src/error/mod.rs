//! Error types for all phases: lexing, parsing, translation and execution.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// What kind of problem a translation diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Writing to a reserved name (`true`, `false`, `void`).
    InvalidStore,
    /// Declaring a reserved name.
    InvalidVariable,
    /// A name that resolves to nothing.
    VariableNotFound,
    /// A string literal with a bad escape sequence.
    InvalidString,
    /// An operator used where it is not allowed.
    InvalidOperator,
    /// `break` or `continue` outside of any loop.
    NotInLoop,
    /// A jump label defined twice.
    LabelAlreadyDefined,
}

/// A single translation diagnostic. Translation does not stop on these;
/// they accumulate, and the compilation unit is withheld if any were
/// recorded.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub kind: DiagnosticKind,
    pub fatal: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

/// Accumulator for translation diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    file: String,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_file("<source>")
    }

    /// Create a collection whose entries are attributed to `file`.
    pub fn with_file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    fn add(&mut self, kind: DiagnosticKind, span: Span, message: String) {
        self.entries.push(Diagnostic {
            file: self.file.clone(),
            line: span.line,
            column: span.column,
            message,
            kind,
            fatal: false,
        });
    }

    pub fn invalid_store(&mut self, name: &str, span: Span) {
        self.add(
            DiagnosticKind::InvalidStore,
            span,
            format!(
                "Changing the value of predefined symbol {} is not allowed.",
                name
            ),
        );
    }

    pub fn invalid_variable(&mut self, name: &str, span: Span) {
        self.add(
            DiagnosticKind::InvalidVariable,
            span,
            format!("The variable name {} is not valid.", name),
        );
    }

    pub fn variable_not_found(&mut self, name: &str, span: Span) {
        self.add(
            DiagnosticKind::VariableNotFound,
            span,
            format!("The variable {} does not exist.", name),
        );
    }

    pub fn invalid_string(&mut self, text: &str, span: Span) {
        self.add(
            DiagnosticKind::InvalidString,
            span,
            format!("The string \"{}\" contains invalid escape sequences.", text),
        );
    }

    pub fn invalid_operator(&mut self, op: &str, span: Span) {
        self.add(
            DiagnosticKind::InvalidOperator,
            span,
            format!("The operator {} is not valid at this point.", op),
        );
    }

    pub fn not_in_loop(&mut self, span: Span) {
        self.add(
            DiagnosticKind::NotInLoop,
            span,
            "Use of break/continue outside of a loop structure.".to_string(),
        );
    }

    pub fn label_already_defined(&mut self, span: Span) {
        self.add(
            DiagnosticKind::LabelAlreadyDefined,
            span,
            "Jump label was defined twice.".to_string(),
        );
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Runtime errors. These are fatal to the virtual machine that raised
/// them: the call stack is unwound and the machine must be discarded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Code pointer or jump target out of range")]
    InvalidPointer,

    #[error("Invalid instruction")]
    InvalidInstruction,

    #[error("Data stack is empty")]
    StackEmpty,

    #[error("Type mismatch")]
    TypeMismatch,

    #[error("Invalid operator")]
    InvalidOperator,

    #[error("Function '{0}' is not known")]
    UnsupportedFunction(String),

    #[error("Object was disposed by the host")]
    ObjectDisposed,

    #[error("Global '{0}' cannot be accessed that way")]
    ReadOnlyVariable(String),

    #[error("Top-level code returned a non-void value")]
    InvalidTopLevelReturn,

    #[error("Variable slot or name is not valid")]
    InvalidVariable,
}

/// Module file loading errors.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Not a LoLa module: bad magic number")]
    InvalidMagic,

    #[error("Unsupported module version {0}")]
    UnsupportedVersion(u32),

    #[error("Module contains debug symbols, which are not supported")]
    DebugSymbolsUnsupported,

    #[error("Module is malformed: {0}")]
    Malformed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type covering every phase.
#[derive(Debug, Error)]
pub enum LolaError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Translation failed:\n{0}")]
    Compile(Diagnostics),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

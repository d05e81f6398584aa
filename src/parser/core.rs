//! Core parser struct and helper methods.

use crate::ast::{FunctionDecl, Program, Stmt};
use crate::error::ParserError;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

/// Recursive-descent parser for LoLa.
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    /// Parse a complete program: top-level statements interleaved with
    /// function declarations.
    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut program = Program::default();

        while !self.is_at_end() {
            if self.check(&TokenKind::Function) {
                program.functions.push(self.function_declaration()?);
            } else {
                program.statements.push(self.statement()?);
            }
        }

        Ok(program)
    }

    fn function_declaration(&mut self) -> ParseResult<FunctionDecl> {
        let span = self.current_span();
        self.expect(&TokenKind::Function)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LeftParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            span,
        })
    }

    pub(crate) fn block(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RightBrace) {
            if self.is_at_end() {
                return Err(ParserError::UnexpectedEof(self.current_span()));
            }
            statements.push(self.statement()?);
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Stmt::new(crate::ast::StmtKind::Block(statements), span))
    }

    // ===== Token manipulation =====

    pub(crate) fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.tokens[self.current - 1].clone()
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        if self.is_at_end() {
            *kind == TokenKind::Eof
        } else {
            std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParserError::unexpected_token(
                kind.describe(),
                self.peek().kind.describe(),
                self.current_span(),
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(ParserError::unexpected_token(
                "identifier",
                other.describe(),
                self.current_span(),
            )),
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }
}

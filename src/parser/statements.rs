//! Statement parsing.

use crate::ast::{BinaryOp, Stmt, StmtKind};
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        match &self.peek().kind {
            TokenKind::Var => self.var_declaration(),
            TokenKind::Extern => self.extern_declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Break => {
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::LeftBrace => self.block(),
            _ => self.expression_statement(),
        }
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::Var)?;
        let name = self.expect_identifier()?;

        let initializer = if self.match_token(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(StmtKind::Declaration { name, initializer }, span))
    }

    fn extern_declaration(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::Extern)?;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(StmtKind::ExternDeclaration { name }, span))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;

        let then_body = Box::new(self.statement()?);
        let else_body = if self.match_token(&TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_body,
                else_body,
            },
            span,
        ))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LeftParen)?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LeftParen)?;
        let variable = self.expect_identifier()?;
        self.expect(&TokenKind::In)?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RightParen)?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::new(
            StmtKind::For {
                variable,
                iterable,
                body,
            },
            span,
        ))
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        self.expect(&TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    /// Either an assignment (`lvalue [op]= expr;`) or a bare expression
    /// statement whose result is discarded.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        let expr = self.expression()?;

        // Outer Option: is this an assignment at all; inner Option: the
        // compound operator, if any.
        let compound: Option<Option<BinaryOp>> = match &self.peek().kind {
            TokenKind::Equal => Some(None),
            TokenKind::PlusEqual => Some(Some(BinaryOp::Add)),
            TokenKind::MinusEqual => Some(Some(BinaryOp::Subtract)),
            TokenKind::StarEqual => Some(Some(BinaryOp::Multiply)),
            TokenKind::SlashEqual => Some(Some(BinaryOp::Divide)),
            TokenKind::PercentEqual => Some(Some(BinaryOp::Modulo)),
            _ => None,
        };

        if let Some(op) = compound {
            if !expr.is_lvalue() {
                return Err(ParserError::InvalidAssignmentTarget(expr.span));
            }
            self.advance();
            let value = self.expression()?;
            self.expect(&TokenKind::Semicolon)?;
            return Ok(Stmt::new(
                StmtKind::Assignment {
                    target: expr,
                    op,
                    value,
                },
                span,
            ));
        }

        self.expect(&TokenKind::Semicolon)?;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }
}

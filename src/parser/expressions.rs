//! Expression parsing with precedence climbing.
//!
//! Precedence, low to high: `or`, `and`, equality (`==` `!=`),
//! comparison (`<` `<=` `>` `>=`), additive (`+` `-`), multiplicative
//! (`*` `/` `%`), unary (`-` `not`), postfix (index, method call).

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.or_expression()
    }

    fn or_expression(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and_expression()?;
        while self.match_token(&TokenKind::Or) {
            let rhs = self.and_expression()?;
            expr = binary(BinaryOp::Or, expr, rhs);
        }
        Ok(expr)
    }

    fn and_expression(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_token(&TokenKind::And) {
            let rhs = self.equality()?;
            expr = binary(BinaryOp::And, expr, rhs);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equals,
                TokenKind::BangEqual => BinaryOp::Differs,
                _ => break,
            };
            self.advance();
            let rhs = self.comparison()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let rhs = self.factor()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            expr = binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let op = match &self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.postfix()
    }

    /// Postfix operations: array indexing and method calls.
    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                self.expect(&TokenKind::LeftParen)?;
                let args = self.argument_list()?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::MethodCall {
                        object: Box::new(expr),
                        name,
                        args,
                    },
                    span,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        match self.peek().kind.clone() {
            TokenKind::NumberLiteral(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(value), span))
            }
            TokenKind::StringLiteral(text) => {
                self.advance();
                Ok(Expr::new(ExprKind::String(text), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_token(&TokenKind::LeftParen) {
                    let args = self.argument_list()?;
                    Ok(Expr::new(ExprKind::Call { name, args }, span))
                } else {
                    Ok(Expr::new(ExprKind::Variable(name), span))
                }
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket)?;
                Ok(Expr::new(ExprKind::Array(elements), span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(expr)
            }
            TokenKind::Eof => Err(ParserError::UnexpectedEof(span)),
            other => Err(ParserError::unexpected_token(
                "expression",
                other.describe(),
                span,
            )),
        }
    }

    /// Comma-separated arguments up to a closing parenthesis, which is
    /// consumed.
    fn argument_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;
        Ok(args)
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span.merge(rhs.span);
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    )
}

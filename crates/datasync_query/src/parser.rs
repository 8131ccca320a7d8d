//! Recursive-descent parser for OData expressions.
//!
//! Precedence, lowest first: `or`, `and`, comparison, additive,
//! multiplicative, unary (`not`, `-`), primary.

use crate::ast::{BinaryOp, EdmType, Expr, Function, Literal, OrderBy, UnaryOp};
use crate::error::{QueryError, QueryResult};
use crate::lexer::{Lexer, Token, TokenKind};

/// Maximum nesting depth, to bound recursion on hostile input.
const MAX_DEPTH: usize = 64;

/// Parses a `$filter` expression.
///
/// # Errors
///
/// Returns a syntax error with the offending position.
pub fn parse_filter(text: &str) -> QueryResult<Expr> {
    let mut parser = Parser::new(text)?;
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses an `$orderby` clause list.
///
/// # Errors
///
/// Returns a syntax error with the offending position.
pub fn parse_orderby(text: &str) -> QueryResult<Vec<OrderBy>> {
    let mut parser = Parser::new(text)?;
    let mut clauses = Vec::new();
    loop {
        let expr = parser.expression()?;
        let descending = if parser.peek().is_keyword("desc") {
            parser.advance();
            true
        } else {
            if parser.peek().is_keyword("asc") {
                parser.advance();
            }
            false
        };
        clauses.push(OrderBy { expr, descending });

        if parser.peek().kind == TokenKind::Comma {
            parser.advance();
            continue;
        }
        parser.expect_end()?;
        return Ok(clauses);
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(text: &str) -> QueryResult<Self> {
        Ok(Self {
            tokens: Lexer::new(text).tokenize()?,
            pos: 0,
            depth: 0,
        })
    }

    fn peek(&self) -> &Token {
        // tokenize() always ends with End, and advance() never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> QueryResult<()> {
        let token = self.advance();
        if token.kind == kind {
            Ok(())
        } else {
            Err(QueryError::syntax(token.position, format!("expected {what}")))
        }
    }

    fn expect_end(&self) -> QueryResult<()> {
        let token = self.peek();
        if token.kind == TokenKind::End {
            Ok(())
        } else {
            Err(QueryError::syntax(token.position, "unexpected trailing input"))
        }
    }

    fn keyword_op(&self, pick: fn(&str) -> Option<BinaryOp>) -> Option<BinaryOp> {
        match &self.peek().kind {
            TokenKind::Identifier(word) => pick(word),
            _ => None,
        }
    }

    fn expression(&mut self) -> QueryResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(QueryError::syntax(self.peek().position, "expression is nested too deeply"));
        }
        let result = self.or();
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> QueryResult<Expr> {
        let mut left = self.and()?;
        while self.peek().is_keyword("or") {
            self.advance();
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> QueryResult<Expr> {
        let mut left = self.comparison()?;
        while self.peek().is_keyword("and") {
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> QueryResult<Expr> {
        let mut left = self.additive()?;
        while let Some(op) = self.keyword_op(BinaryOp::comparison) {
            self.advance();
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> QueryResult<Expr> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.keyword_op(BinaryOp::additive) {
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> QueryResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.keyword_op(BinaryOp::multiplicative) {
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> QueryResult<Expr> {
        if self.peek().kind == TokenKind::Minus {
            self.advance();
            return Ok(match self.unary()? {
                Expr::Literal(Literal::Integer(n)) => Expr::Literal(Literal::Integer(-n)),
                Expr::Literal(Literal::Real(n)) => Expr::Literal(Literal::Real(-n)),
                other => Expr::Unary(UnaryOp::Negate, Box::new(other)),
            });
        }
        if self.peek().is_keyword("not") {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> QueryResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Integer(n) => Ok(Expr::Literal(Literal::Integer(n))),
            TokenKind::Real(n) => Ok(Expr::Literal(Literal::Real(n))),
            TokenKind::String(s) => Ok(Expr::Literal(Literal::String(s))),
            TokenKind::Date(d) => Ok(Expr::Literal(Literal::Date(d))),
            TokenKind::OpenParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Identifier(name) => match name.as_str() {
                "null" => Ok(Expr::Literal(Literal::Null)),
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                _ if self.peek().kind == TokenKind::OpenParen => self.call(&name, token.position),
                _ => self.member(name),
            },
            TokenKind::End => Err(QueryError::syntax(token.position, "unexpected end of expression")),
            _ => Err(QueryError::syntax(token.position, "expression expected")),
        }
    }

    fn member(&mut self, first: String) -> QueryResult<Expr> {
        let mut path = vec![first];
        while self.peek().kind == TokenKind::Slash {
            self.advance();
            let token = self.advance();
            match token.kind {
                TokenKind::Identifier(name) => path.push(name),
                _ => return Err(QueryError::syntax(token.position, "property name expected")),
            }
        }
        Ok(Expr::Member(path))
    }

    fn call(&mut self, name: &str, position: usize) -> QueryResult<Expr> {
        let (function, min, max) = Function::lookup(name)
            .ok_or_else(|| QueryError::syntax(position, format!("unknown function '{name}'")))?;
        self.expect(TokenKind::OpenParen, "'('")?;

        if function == Function::Cast {
            let value = self.expression()?;
            self.expect(TokenKind::Comma, "','")?;
            let token = self.advance();
            let target = match &token.kind {
                TokenKind::Identifier(type_name) => EdmType::parse(type_name),
                _ => None,
            }
            .ok_or_else(|| QueryError::syntax(token.position, "EDM type expected"))?;
            self.expect(TokenKind::CloseParen, "')'")?;
            return Ok(Expr::Cast(Box::new(value), target));
        }

        let mut args = Vec::new();
        if self.peek().kind != TokenKind::CloseParen {
            loop {
                args.push(self.expression()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::CloseParen, "')'")?;

        if args.len() < min || args.len() > max {
            return Err(QueryError::syntax(
                position,
                format!("{name} takes {min}..={max} arguments, got {}", args.len()),
            ));
        }
        Ok(Expr::Call(function, args))
    }
}

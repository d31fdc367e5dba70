// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, loosest first: ternary, `or`, `and`, `not`, comparison,
//! additive, multiplicative, unary minus, postfix access.

use serde_json::Value;

use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Field { target: Box<Expr>, name: String, safe: bool },
    Index { target: Box<Expr>, index: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Ternary { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Deepest nesting accepted. Parentheses, ternaries, prefix operators,
/// and each link of an operator or access chain count one level.
pub const MAX_DEPTH: usize = 128;

pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, cursor: 0, len: source.len(), depth: 0 };
    let expr = parser.expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::parse(extra.pos, format!("unexpected {:?} after expression", extra.token)));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    /// Source length, reported as the position of "unexpected end".
    len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.cursor)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(token) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Consume a word operator such as `and` (case-insensitive).
    fn eat_word(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Spanned { token: Token::Ident(name), .. }) if name.eq_ignore_ascii_case(word) => {
                self.cursor += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExprError> {
        if self.eat(&token) {
            Ok(())
        } else {
            let pos = self.peek().map(|s| s.pos).unwrap_or(self.len);
            Err(ExprError::parse(pos, format!("expected {}", what)))
        }
    }

    /// Take one nesting level, failing once past [`MAX_DEPTH`].
    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let pos = self.peek().map(|s| s.pos).unwrap_or(self.len);
            return Err(ExprError::parse(pos, format!("expression nested deeper than {} levels", MAX_DEPTH)));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        self.descend()?;
        let cond = self.or()?;
        let out = if self.eat(&Token::Question) {
            let then = self.expr()?;
            self.expect(Token::Colon, "':' in conditional expression")?;
            let otherwise = self.expr()?;
            Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            cond
        };
        self.depth = depth;
        Ok(out)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) || self.eat_word("or") {
            self.descend()?;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.not()?;
        while self.eat(&Token::AndAnd) || self.eat_word("and") {
            self.descend()?;
            let rhs = self.not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Bang) || self.eat_word("not") {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.additive()?;
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "eq" => Some(BinaryOp::Eq),
                "ne" => Some(BinaryOp::Ne),
                "lt" => Some(BinaryOp::Lt),
                "le" => Some(BinaryOp::Le),
                "gt" => Some(BinaryOp::Gt),
                "ge" => Some(BinaryOp::Ge),
                _ => None,
            },
            _ => None,
        };
        match op {
            Some(op) => {
                self.cursor += 1;
                let rhs = self.additive()?;
                Ok(binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                self.depth = depth;
                return Ok(lhs);
            };
            self.descend()?;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash) {
                BinaryOp::Div
            } else if self.eat(&Token::Percent) {
                BinaryOp::Rem
            } else {
                self.depth = depth;
                return Ok(lhs);
            };
            self.descend()?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let depth = self.depth;
        let mut target = self.primary()?;
        loop {
            if matches!(
                self.peek().map(|s| &s.token),
                Some(Token::Dot | Token::SafeDot | Token::LBracket)
            ) {
                self.descend()?;
            }
            let safe = if self.eat(&Token::Dot) {
                false
            } else if self.eat(&Token::SafeDot) {
                true
            } else if self.eat(&Token::LBracket) {
                let index = self.expr()?;
                self.expect(Token::RBracket, "']'")?;
                target = Expr::Index { target: Box::new(target), index: Box::new(index) };
                continue;
            } else {
                self.depth = depth;
                return Ok(target);
            };

            match self.advance() {
                Some(Spanned { token: Token::Ident(name), .. }) => {
                    target = Expr::Field { target: Box::new(target), name, safe };
                }
                Some(other) => return Err(ExprError::parse(other.pos, "expected field name")),
                None => return Err(ExprError::parse(self.len, "expected field name")),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some(Spanned { token, pos }) = self.advance() else {
            return Err(ExprError::parse(self.len, "unexpected end of expression"));
        };

        match token {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Var(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(word) => match word.to_ascii_lowercase().as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => Err(ExprError::parse(
                    pos,
                    format!("unknown identifier '{}' (variables are written '#{}')", word, word),
                )),
            },
            other => Err(ExprError::parse(pos, format!("unexpected {:?}", other))),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

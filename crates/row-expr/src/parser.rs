//! Pratt parser producing an [`Expr`] tree.

use crate::error::{ExprError, Result};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::value::Value;

/// Maximum nesting depth accepted by the parser.
pub(crate) const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn binding_power(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::NotEq => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::In => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
}

impl Expr {
    /// Root identifiers referenced by this expression.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Ident(name) = e {
                out.push(name.as_str());
            }
        });
        out
    }

    /// Function names called by this expression.
    pub fn calls(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Call(name, _) = e {
                out.push(name.as_str());
            }
        });
        out
    }

    fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Member(inner, _) | Expr::Unary(_, inner) => inner.walk(f),
            Expr::Index(a, b) | Expr::Binary(_, a, b) => {
                a.walk(f);
                b.walk(f);
            }
            Expr::Conditional(a, b, c) => {
                a.walk(f);
                b.walk(f);
                c.walk(f);
            }
            Expr::Call(_, args) | Expr::List(args) => {
                for arg in args {
                    arg.walk(f);
                }
            }
        }
    }
}

pub(crate) fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::UnexpectedToken {
            found: token.kind.describe(),
            expected: "end of expression",
            offset: token.offset,
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<()> {
        match self.next() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                expected,
                offset: token.offset,
            }),
            None => Err(ExprError::UnexpectedEnd(expected)),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let cond = self.binary(0)?;
        let expr = if self.eat(&TokenKind::Question) {
            let then = self.expression()?;
            self.expect(TokenKind::Colon, "':'")?;
            let otherwise = self.expression()?;
            Expr::Conditional(Box::new(cond), Box::new(then), Box::new(otherwise))
        } else {
            cond
        };
        self.leave();
        Ok(expr)
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        let op = match &self.peek()?.kind {
            TokenKind::OrOr => BinaryOp::Or,
            TokenKind::AndAnd => BinaryOp::And,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Rem,
            TokenKind::Ident(word) => match word.as_str() {
                "or" => BinaryOp::Or,
                "and" => BinaryOp::And,
                "in" => BinaryOp::In,
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    fn binary(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_binary() {
            let bp = op.binding_power();
            if bp <= min_bp {
                break;
            }
            self.pos += 1;
            self.enter()?;
            let rhs = self.binary(bp)?;
            self.leave();
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Ident(w)) if w == "not" => Some(UnaryOp::Not),
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                self.enter()?;
                let operand = self.unary()?;
                self.leave();
                Ok(Expr::Unary(op, Box::new(operand)))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Ident(name),
                        ..
                    }) => expr = Expr::Member(Box::new(expr), name),
                    Some(token) => {
                        return Err(ExprError::UnexpectedToken {
                            found: token.kind.describe(),
                            expected: "member name",
                            offset: token.offset,
                        })
                    }
                    None => return Err(ExprError::UnexpectedEnd("member name")),
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(token) = self.next() else {
            return Err(ExprError::UnexpectedEnd("expression"));
        };
        match token.kind {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let items = self.arguments(TokenKind::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "nil" | "null" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" | "in" => Err(ExprError::UnexpectedToken {
                    found: format!("keyword '{word}'"),
                    expected: "expression",
                    offset: token.offset,
                }),
                _ if self.eat(&TokenKind::LParen) => {
                    let args = self.arguments(TokenKind::RParen, "')'")?;
                    Ok(Expr::Call(word, args))
                }
                _ => Ok(Expr::Ident(word)),
            },
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                expected: "expression",
                offset: token.offset,
            }),
        }
    }

    fn arguments(&mut self, close: TokenKind, expected: &'static str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(close.clone(), expected)?;
            return Ok(items);
        }
    }
}

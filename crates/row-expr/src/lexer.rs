//! Tokenizer.

use crate::error::{ExprError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Int(i) => format!("number {i}"),
            TokenKind::Float(f) => format!("number {f}"),
            TokenKind::Str(s) => format!("string {s:?}"),
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Int(_) | TokenKind::Float(_) | TokenKind::Str(_) | TokenKind::Ident(_) => {
                ""
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if f(c)) {
            self.bump();
        }
        &self.input[start..self.pos]
    }
}

/// Tokenize an expression source string.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut cursor = Cursor::new(input);
    let mut tokens = Vec::with_capacity((input.len() / 4).max(4));

    loop {
        cursor.skip_whitespace();
        let offset = cursor.pos;
        let Some(ch) = cursor.peek() else {
            break;
        };

        let kind = match ch {
            '0'..='9' => scan_number(&mut cursor)?,
            '\'' | '"' => scan_string(&mut cursor, ch)?,
            '`' => {
                cursor.bump();
                let name = cursor.take_while(|c| c != '`');
                if !cursor.eat('`') {
                    return Err(ExprError::UnterminatedString(offset));
                }
                TokenKind::Ident(name.to_string())
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let word = cursor.take_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
                TokenKind::Ident(word.to_string())
            }
            _ => {
                cursor.bump();
                match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    '[' => TokenKind::LBracket,
                    ']' => TokenKind::RBracket,
                    ',' => TokenKind::Comma,
                    '.' => TokenKind::Dot,
                    '?' => TokenKind::Question,
                    ':' => TokenKind::Colon,
                    '+' => TokenKind::Plus,
                    '-' => TokenKind::Minus,
                    '*' => TokenKind::Star,
                    '/' => TokenKind::Slash,
                    '%' => TokenKind::Percent,
                    '!' if cursor.eat('=') => TokenKind::NotEq,
                    '!' => TokenKind::Bang,
                    '=' if cursor.eat('=') => TokenKind::EqEq,
                    '<' if cursor.eat('=') => TokenKind::Le,
                    '<' => TokenKind::Lt,
                    '>' if cursor.eat('=') => TokenKind::Ge,
                    '>' => TokenKind::Gt,
                    '&' if cursor.eat('&') => TokenKind::AndAnd,
                    '|' if cursor.eat('|') => TokenKind::OrOr,
                    _ => return Err(ExprError::UnexpectedChar { ch, offset }),
                }
            }
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn scan_number(cursor: &mut Cursor<'_>) -> Result<TokenKind> {
    let start = cursor.pos;
    cursor.take_while(|c| c.is_ascii_digit() || c == '_');
    let mut is_float = false;
    if cursor.peek() == Some('.') && matches!(cursor.peek_ahead(1), Some(c) if c.is_ascii_digit()) {
        is_float = true;
        cursor.bump();
        cursor.take_while(|c| c.is_ascii_digit() || c == '_');
    }
    if matches!(cursor.peek(), Some('e' | 'E')) {
        is_float = true;
        cursor.bump();
        if matches!(cursor.peek(), Some('+' | '-')) {
            cursor.bump();
        }
        cursor.take_while(|c| c.is_ascii_digit());
    }
    let text: String = cursor.input[start..cursor.pos]
        .chars()
        .filter(|c| *c != '_')
        .collect();
    if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| ExprError::InvalidNumber(text))
    } else {
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ExprError::InvalidNumber(text))
    }
}

fn scan_string(cursor: &mut Cursor<'_>, quote: char) -> Result<TokenKind> {
    let start = cursor.pos;
    cursor.bump();
    let mut out = String::new();
    loop {
        match cursor.bump() {
            None => return Err(ExprError::UnterminatedString(start)),
            Some(c) if c == quote => break,
            Some('\\') => match cursor.bump() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(c) => out.push(c),
                None => return Err(ExprError::UnterminatedString(start)),
            },
            Some(c) => out.push(c),
        }
    }
    Ok(TokenKind::Str(out))
}

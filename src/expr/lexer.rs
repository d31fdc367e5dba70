//! Tokenizer for key/condition/payload expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    /// `#name`
    Var(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Dot,
    /// `?.`
    SafeDot,
    Question,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// A token plus the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            b'\'' | b'"' => {
                let (s, next) = read_string(source, i)?;
                i = next;
                Token::Str(s)
            }
            b'0'..=b'9' => {
                let (t, next) = read_number(source, i)?;
                i = next;
                t
            }
            b'#' => {
                let end = ident_end(bytes, i + 1);
                if end == i + 1 {
                    return Err(ExprError::parse(i, "expected variable name after '#'"));
                }
                i = end;
                Token::Var(source[start + 1..end].to_string())
            }
            c if is_ident_start(c) => {
                let end = ident_end(bytes, i);
                i = end;
                Token::Ident(source[start..end].to_string())
            }
            _ => {
                let next = bytes.get(i + 1).copied();
                let (t, width) = match (c, next) {
                    (b'=', Some(b'=')) => (Token::EqEq, 2),
                    (b'!', Some(b'=')) => (Token::NotEq, 2),
                    (b'<', Some(b'=')) => (Token::Le, 2),
                    (b'>', Some(b'=')) => (Token::Ge, 2),
                    (b'&', Some(b'&')) => (Token::AndAnd, 2),
                    (b'|', Some(b'|')) => (Token::OrOr, 2),
                    (b'?', Some(b'.')) => (Token::SafeDot, 2),
                    (b'<', _) => (Token::Lt, 1),
                    (b'>', _) => (Token::Gt, 1),
                    (b'!', _) => (Token::Bang, 1),
                    (b'+', _) => (Token::Plus, 1),
                    (b'-', _) => (Token::Minus, 1),
                    (b'*', _) => (Token::Star, 1),
                    (b'/', _) => (Token::Slash, 1),
                    (b'%', _) => (Token::Percent, 1),
                    (b'.', _) => (Token::Dot, 1),
                    (b'?', _) => (Token::Question, 1),
                    (b':', _) => (Token::Colon, 1),
                    (b'(', _) => (Token::LParen, 1),
                    (b')', _) => (Token::RParen, 1),
                    (b'[', _) => (Token::LBracket, 1),
                    (b']', _) => (Token::RBracket, 1),
                    _ => {
                        let ch = source[i..].chars().next().unwrap_or('?');
                        return Err(ExprError::parse(i, format!("unexpected character '{}'", ch)));
                    }
                };
                i += width;
                t
            }
        };

        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn ident_end(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$') {
        i += 1;
    }
    i
}

/// Quoted string; the quote character is escaped by doubling it (`'it''s'`).
fn read_string(source: &str, start: usize) -> Result<(String, usize), ExprError> {
    let quote = source.as_bytes()[start] as char;
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if ch == quote {
            if let Some(&(_, next)) = chars.peek() {
                if next == quote {
                    out.push(quote);
                    chars.next();
                    continue;
                }
            }
            return Ok((out, start + 1 + offset + ch.len_utf8()));
        }
        out.push(ch);
    }

    Err(ExprError::parse(start, "unterminated string literal"))
}

fn read_number(source: &str, start: usize) -> Result<(Token, usize), ExprError> {
    let bytes = source.as_bytes();
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }

    // A dot only belongs to the number when a digit follows it.
    let is_float = i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit();
    if is_float {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let text = &source[start..i];
        let value = text
            .parse::<f64>()
            .map_err(|e| ExprError::parse(start, format!("invalid number '{}': {}", text, e)))?;
        return Ok((Token::Float(value), i));
    }

    let text = &source[start..i];
    let value = text
        .parse::<i64>()
        .map_err(|e| ExprError::parse(start, format!("invalid number '{}': {}", text, e)))?;
    Ok((Token::Int(value), i))
}

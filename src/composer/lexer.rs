//! A minimal SQL lexer.
//!
//! It only knows enough to find token boundaries: literals, quoted
//! identifiers and comments are opaque spans, so a relation name inside them
//! is never mistaken for a reference. Every token records its byte range in
//! the source, which lets the composer splice replacements without
//! re-rendering the statement.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// `"name"`, `` `name` `` or `[name]`.
    QuotedIdent,
    StringLit,
    Number,
    /// `?`, `?NNN`, `:name`, `@name`, `$name`.
    Placeholder,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,
    Operator,
    Whitespace,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    /// Case-insensitive keyword test; only meaningful for [`TokenKind::Word`].
    pub fn is_keyword(&self, source: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(source).eq_ignore_ascii_case(keyword)
    }

    /// Identifier value with quotes stripped and doubled quotes collapsed.
    pub fn identifier(&self, source: &str) -> Option<String> {
        let text = self.text(source);
        match self.kind {
            TokenKind::Word => Some(text.to_string()),
            TokenKind::QuotedIdent => {
                let inner = &text[1..text.len() - 1];
                Some(match text.as_bytes()[0] {
                    b'"' => inner.replace("\"\"", "\""),
                    b'`' => inner.replace("``", "`"),
                    _ => inner.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Parameter name without its sigil; `None` for positional `?` markers.
    pub fn placeholder_name<'a>(&self, source: &'a str) -> Option<&'a str> {
        let text = self.text(source);
        match (self.kind, text.as_bytes().first()) {
            (TokenKind::Placeholder, Some(b':' | b'@' | b'$')) => Some(&text[1..]),
            _ => None,
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let byte = bytes[pos];
        let kind = match byte {
            b if b.is_ascii_whitespace() => {
                pos = skip_while(bytes, pos, |b| b.is_ascii_whitespace());
                TokenKind::Whitespace
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                pos = skip_while(bytes, pos, |b| b != b'\n');
                TokenKind::Comment
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = find(bytes, pos + 2, b"*/").ok_or(LexError::Unterminated {
                    what: "block comment",
                    offset: start,
                })? + 2;
                TokenKind::Comment
            }
            b'\'' => {
                pos = quoted_end(bytes, pos, b'\'', "string literal")?;
                TokenKind::StringLit
            }
            b'"' | b'`' => {
                pos = quoted_end(bytes, pos, byte, "quoted identifier")?;
                TokenKind::QuotedIdent
            }
            b'[' => {
                pos = find(bytes, pos + 1, b"]").ok_or(LexError::Unterminated {
                    what: "bracketed identifier",
                    offset: start,
                })? + 1;
                TokenKind::QuotedIdent
            }
            b'0'..=b'9' => {
                pos = number_end(bytes, pos);
                TokenKind::Number
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                pos = number_end(bytes, pos);
                TokenKind::Number
            }
            b if is_ident_start(b) => {
                pos = skip_while(bytes, pos, is_ident_continue);
                TokenKind::Word
            }
            b'?' => {
                pos = skip_while(bytes, pos + 1, |b| b.is_ascii_digit());
                TokenKind::Placeholder
            }
            b':' | b'@' | b'$' if bytes.get(pos + 1).is_some_and(|b| is_ident_start(*b)) => {
                pos = skip_while(bytes, pos + 1, is_ident_continue);
                TokenKind::Placeholder
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b',' => {
                pos += 1;
                TokenKind::Comma
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b'.' => {
                pos += 1;
                TokenKind::Dot
            }
            _ => {
                pos += 1;
                TokenKind::Operator
            }
        };
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte >= 0x80
}

fn is_ident_continue(byte: u8) -> bool {
    is_ident_start(byte) || byte.is_ascii_digit() || byte == b'$'
}

fn skip_while(bytes: &[u8], mut pos: usize, predicate: impl Fn(u8) -> bool) -> usize {
    while pos < bytes.len() && predicate(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

/// End of a literal delimited by `quote`, where a doubled quote is an escape.
fn quoted_end(
    bytes: &[u8],
    start: usize,
    quote: u8,
    what: &'static str,
) -> Result<usize, LexError> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Ok(pos + 1);
        }
        pos += 1;
    }
    Err(LexError::Unterminated {
        what,
        offset: start,
    })
}

fn number_end(bytes: &[u8], start: usize) -> usize {
    let mut pos = start;
    while pos < bytes.len() {
        let byte = bytes[pos];
        let exponent_sign = matches!(byte, b'+' | b'-')
            && pos > start
            && matches!(bytes[pos - 1], b'e' | b'E')
            && !bytes[start..pos].starts_with(b"0x");
        if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_' || exponent_sign {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

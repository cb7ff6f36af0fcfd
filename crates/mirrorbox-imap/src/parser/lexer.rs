//! Tokenizer for server responses.
//!
//! Operates on one complete response as produced by the framing layer, so
//! literals are already inline (`{n}\r\n` followed by `n` bytes).

use crate::{Error, Result};

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare atom, including flag atoms such as `\Seen`.
    Atom(&'a str),
    /// All-digit atom.
    Number(u64),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// Literal payload.
    Literal(&'a [u8]),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// ` `
    Space,
    /// `*`
    Star,
    /// `NIL`
    Nil,
    /// `\r\n`
    Crlf,
    /// End of input.
    Eof,
}

/// Cursor over one response.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Peeks at the next raw byte.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consumes `byte` if it is next. Returns whether it did.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Returns true when only CRLF or nothing remains.
    #[must_use]
    pub fn at_line_end(&self) -> bool {
        matches!(&self.input[self.pos..], [] | [b'\r', b'\n', ..])
    }

    /// Builds a parse error at the current position.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };
        let single = match byte {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b' ' => Some(Token::Space),
            b'*' => Some(Token::Star),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }
        match byte {
            b'\r' if self.input.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            b'"' => self.quoted(),
            b'{' => self.literal(),
            b'\\' if self.input.get(self.pos + 1) == Some(&b'*') => {
                let start = self.pos;
                self.pos += 2;
                Ok(Token::Atom(self.slice_str(start)?))
            }
            _ if is_atom_char(byte) => self.atom(),
            _ => Err(self.error(format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn slice_str(&self, start: usize) -> Result<&'a str> {
        std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| self.error("invalid UTF-8"))
    }

    fn atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.pos += 1;
        }
        let s = self.slice_str(start)?;
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Token::Number)
                .map_err(|_| self.error("number out of range"));
        }
        if s.eq_ignore_ascii_case("NIL") {
            return Ok(Token::Nil);
        }
        Ok(Token::Atom(s))
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c @ (b'"' | b'\\')) => out.push(c),
                        _ => return Err(self.error("invalid escape in quoted string")),
                    }
                    self.pos += 1;
                }
                Some(b'\r' | b'\n') | None => {
                    return Err(self.error("unterminated quoted string"));
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out)
            .map(Token::Quoted)
            .map_err(|_| self.error("invalid UTF-8 in quoted string"))
    }

    fn literal(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        let len: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid literal length"))?;
        self.eat(b'+');
        if !(self.eat(b'}') && self.eat(b'\r') && self.eat(b'\n')) {
            return Err(self.error("malformed literal prefix"));
        }
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("truncated literal"))?;
        let data = &self.input[self.pos..end];
        self.pos = end;
        Ok(Token::Literal(data))
    }

    /// Consumes a single space or fails.
    pub fn expect_space(&mut self) -> Result<()> {
        if self.eat(b' ') {
            Ok(())
        } else {
            Err(self.error("expected space"))
        }
    }

    /// Reads an atom and returns it.
    pub fn atom_str(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            other => Err(self.error(format!("expected atom, got {other:?}"))),
        }
    }

    /// Reads a number.
    pub fn number(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            other => Err(self.error(format!("expected number, got {other:?}"))),
        }
    }

    /// Reads a number that must fit in 32 bits.
    pub fn number32(&mut self) -> Result<u32> {
        let n = self.number()?;
        u32::try_from(n).map_err(|_| self.error("number exceeds 32 bits"))
    }

    /// Reads an `nstring` (NIL, quoted or literal) as raw bytes.
    pub fn nstring_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Quoted(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data.to_vec())),
            other => Err(self.error(format!("expected nstring, got {other:?}"))),
        }
    }

    /// Reads an `nstring` as lossy UTF-8 text.
    pub fn nstring(&mut self) -> Result<Option<String>> {
        Ok(self
            .nstring_bytes()?
            .map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Reads an `astring` (atom, number, quoted or literal).
    pub fn astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::Quoted(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(data).into_owned()),
            Token::Nil => Ok("NIL".to_string()),
            other => Err(self.error(format!("expected astring, got {other:?}"))),
        }
    }

    /// Reads raw bytes up to (not including) `stop`.
    pub fn until(&mut self, stop: u8) -> Result<&'a str> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b != stop && b != b'\r') {
            self.pos += 1;
        }
        self.slice_str(start)
    }

    /// Reads the rest of the line as text and consumes the CRLF.
    pub fn rest_of_line(&mut self) -> String {
        let start = self.pos;
        while !self.at_line_end() {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        self.eat(b'\r');
        self.eat(b'\n');
        text
    }

    /// Skips one value: atom, number, string, literal or a nested list.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token()? {
                Token::LParen | Token::LBracket => depth += 1,
                Token::RParen | Token::RBracket => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| self.error("unbalanced list"))?;
                }
                Token::Crlf | Token::Eof => return Err(self.error("unexpected end of value")),
                _ => {}
            }
            if depth == 0 {
                // Section suffixes like BODY[...]<0> belong to the same value.
                if self.eat(b'<') {
                    self.until(b'>')?;
                    self.eat(b'>');
                }
                return Ok(());
            }
        }
    }
}

/// ATOM-CHAR per RFC 3501, minus `[` so that `BODY[` and `OK [` split cleanly.
const fn is_atom_char(b: u8) -> bool {
    !matches!(
        b,
        b'(' | b')' | b'{' | b' ' | b'%' | b'*' | b'"' | b']' | b'['
    ) && b > 0x1F
        && b < 0x7F
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token().unwrap();
            if t == Token::Eof {
                return out;
            }
            out.push(t);
        }
    }

    #[test]
    fn flags_are_atoms() {
        assert_eq!(
            tokens(b"(\\Seen \\*)"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::Space,
                Token::Atom("\\*"),
                Token::RParen
            ]
        );
    }

    #[test]
    fn large_numbers_fit_u64() {
        assert_eq!(tokens(b"90060115205545359"), vec![Token::Number(90_060_115_205_545_359)]);
    }

    #[test]
    fn literal_is_sliced() {
        let mut lexer = Lexer::new(b"{5}\r\nhello)");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn truncated_literal_is_an_error() {
        let mut lexer = Lexer::new(b"{10}\r\nabc");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn quoted_string_escapes() {
        assert_eq!(
            tokens(b"\"a \\\"b\\\" c\""),
            vec![Token::Quoted("a \"b\" c".into())]
        );
    }

    #[test]
    fn nil_is_case_insensitive() {
        assert_eq!(tokens(b"nil"), vec![Token::Nil]);
    }

    #[test]
    fn skip_value_handles_nested_lists_and_partials() {
        let mut lexer = Lexer::new(b"(a (b \"c\") {1}\r\nx) BODY[TEXT]<0> rest");
        lexer.skip_value().unwrap();
        lexer.expect_space().unwrap();
        assert_eq!(lexer.atom_str().unwrap(), "BODY");
        lexer.skip_value().unwrap();
        lexer.expect_space().unwrap();
        assert_eq!(lexer.atom_str().unwrap(), "rest");
    }
}

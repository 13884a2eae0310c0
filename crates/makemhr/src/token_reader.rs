//! A small ring-buffered lexer for definition files and ASCII sources.
//!
//! Whitespace is not significant and `#` starts a comment running to the end of the line.  Tokens are identifiers,
//! integers, floats, double-quoted strings (which may not span lines), and operators.  Nothing is tokenized ahead of
//! time: the `is_*` methods peek without consuming, and the `read_*` methods consume one token or fail with an error
//! positioned at the start of the offending token.
use std::io::{ErrorKind, Read};

use crate::error::ParseError;

const RING_BITS: u32 = 16;
const RING_SIZE: usize = 1 << RING_BITS;
const RING_MASK: usize = RING_SIZE - 1;
const LOAD_SIZE: usize = RING_SIZE >> 2;

/// Numeric tokens longer than this are rejected rather than parsed.
const MAX_NUMBER_LEN: usize = 64;

pub type ParseResult<T> = std::result::Result<T, ParseError>;

pub struct TokenReader<R> {
    input: R,
    name: String,
    ring: Box<[u8]>,
    /// Total bytes ever written into / consumed from the ring.  Only the masked values index it.
    in_pos: usize,
    out_pos: usize,
    eof: bool,
    line: u32,
    column: u32,
}

impl<R: Read> TokenReader<R> {
    /// `name` appears in errors; paths are reduced to their final component.
    pub fn new(input: R, name: &str) -> Self {
        Self::with_prefix(input, name, &[])
    }

    /// Like [TokenReader::new], for when the first bytes of `input` were already consumed (e.g. to sniff the format).
    pub fn with_prefix(input: R, name: &str, prefix: &[u8]) -> Self {
        assert!(prefix.len() <= RING_SIZE);
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name).to_string();

        let mut ring = vec![0u8; RING_SIZE].into_boxed_slice();
        ring[..prefix.len()].copy_from_slice(prefix);

        TokenReader {
            input,
            name: base,
            ring,
            in_pos: prefix.len(),
            out_pos: 0,
            eof: false,
            line: 1,
            column: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn error_at(&self, line: u32, column: u32, message: impl Into<String>) -> ParseError {
        ParseError {
            file: self.name.clone(),
            line,
            column,
            message: message.into(),
        }
    }

    /// An error at the current position.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.line, self.column, message)
    }

    /// Top up the ring if there's room, returning whether any unread input remains.
    fn load(&mut self) -> ParseResult<bool> {
        let available = self.in_pos - self.out_pos;
        if !self.eof && RING_SIZE - available >= LOAD_SIZE {
            let start = self.in_pos & RING_MASK;
            let end = (start + LOAD_SIZE).min(RING_SIZE);
            loop {
                match self.input.read(&mut self.ring[start..end]) {
                    Ok(0) => {
                        self.eof = true;
                        break;
                    }
                    Ok(n) => {
                        self.in_pos += n;
                        break;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(self.error(format!("Read error: {e}"))),
                }
            }
        }
        Ok(self.in_pos > self.out_pos)
    }

    /// The next unread byte.  Only valid after `load` returned true.
    fn current(&self) -> u8 {
        self.ring[self.out_pos & RING_MASK]
    }

    fn peek(&mut self) -> ParseResult<Option<u8>> {
        Ok(if self.load()? {
            Some(self.current())
        } else {
            None
        })
    }

    fn skip_line(&mut self) -> ParseResult<()> {
        while self.load()? {
            let ch = self.current();
            self.out_pos += 1;
            if ch == b'\n' {
                self.line += 1;
                self.column = 1;
                break;
            }
            self.column += 1;
        }
        Ok(())
    }

    /// Skip to the next token, returning whether there is one.
    pub fn skip_whitespace(&mut self) -> ParseResult<bool> {
        while self.load()? {
            let ch = self.current();
            if ch.is_ascii_whitespace() {
                self.out_pos += 1;
                if ch == b'\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            } else if ch == b'#' {
                self.skip_line()?;
            } else {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether all input has been consumed, ignoring whitespace and comments.
    pub fn at_end(&mut self) -> ParseResult<bool> {
        Ok(!self.skip_whitespace()?)
    }

    /// Line and column of the next token (or of the end of input).
    pub fn position(&mut self) -> ParseResult<(u32, u32)> {
        self.skip_whitespace()?;
        Ok((self.line, self.column))
    }

    /// Whether the next token looks like an identifier.
    pub fn is_ident(&mut self) -> ParseResult<bool> {
        if !self.skip_whitespace()? {
            return Ok(false);
        }
        let ch = self.current();
        Ok(ch == b'_' || ch.is_ascii_alphabetic())
    }

    /// Whether the next token is the operator `op`.
    pub fn is_operator(&mut self, op: &str) -> ParseResult<bool> {
        if !self.skip_whitespace()? {
            return Ok(false);
        }
        let op = op.as_bytes();
        if self.in_pos - self.out_pos < op.len() {
            return Ok(false);
        }
        Ok(op
            .iter()
            .enumerate()
            .all(|(i, b)| self.ring[(self.out_pos + i) & RING_MASK] == *b))
    }

    pub fn read_ident(&mut self) -> ParseResult<String> {
        let mut col = self.column;
        if self.skip_whitespace()? {
            col = self.column;
            let mut ch = self.current();
            if ch == b'_' || ch.is_ascii_alphabetic() {
                let mut ret = String::new();
                loop {
                    ret.push(ch as char);
                    self.column += 1;
                    self.out_pos += 1;
                    match self.peek()? {
                        Some(c) if c == b'_' || c.is_ascii_alphanumeric() => ch = c,
                        _ => break,
                    }
                }
                return Ok(ret);
            }
        }
        Err(self.error_at(self.line, col, "Expected an identifier."))
    }

    /// Consume an optional sign and a run of digits into `text`, returning the digit count.
    fn take_digits(&mut self, text: &mut String) -> ParseResult<usize> {
        let mut digits = 0;
        while let Some(ch) = self.peek()? {
            if !ch.is_ascii_digit() {
                break;
            }
            text.push(ch as char);
            self.out_pos += 1;
            digits += 1;
        }
        Ok(digits)
    }

    fn take_sign(&mut self, text: &mut String) -> ParseResult<()> {
        if let Some(ch @ (b'+' | b'-')) = self.peek()? {
            text.push(ch as char);
            self.out_pos += 1;
        }
        Ok(())
    }

    /// A number may not run straight into an identifier or another decimal point.
    fn number_is_terminated(&mut self) -> ParseResult<bool> {
        Ok(!matches!(self.peek()?, Some(ch) if ch == b'.' || ch.is_ascii_alphabetic()))
    }

    /// Read an integer in `lo..=hi`.
    pub fn read_int(&mut self, lo: i64, hi: i64) -> ParseResult<i64> {
        let mut col = self.column;
        if self.skip_whitespace()? {
            col = self.column;
            let mut text = String::new();
            self.take_sign(&mut text)?;
            let digits = self.take_digits(&mut text)?;
            self.column += text.len() as u32;
            if digits > 0 && self.number_is_terminated()? {
                if text.len() > MAX_NUMBER_LEN {
                    return Err(self.error_at(self.line, col, "Integer is too long."));
                }
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.error_at(self.line, col, "Integer is too long."))?;
                if value < lo || value > hi {
                    return Err(self.error_at(
                        self.line,
                        col,
                        format!("Expected a value from {lo} to {hi}."),
                    ));
                }
                return Ok(value);
            }
        }
        Err(self.error_at(self.line, col, "Expected an integer."))
    }

    /// Read a float in `lo..=hi`.  Integers are accepted.
    pub fn read_float(&mut self, lo: f64, hi: f64) -> ParseResult<f64> {
        let mut col = self.column;
        if self.skip_whitespace()? {
            col = self.column;
            let mut text = String::new();
            self.take_sign(&mut text)?;
            let mut digits = self.take_digits(&mut text)?;
            if self.peek()? == Some(b'.') {
                text.push('.');
                self.out_pos += 1;
            }
            digits += self.take_digits(&mut text)?;

            if digits > 0 {
                if let Some(e @ (b'e' | b'E')) = self.peek()? {
                    text.push(e as char);
                    self.out_pos += 1;
                    self.take_sign(&mut text)?;
                    digits = self.take_digits(&mut text)?;
                }
            }
            self.column += text.len() as u32;

            if digits > 0 && self.number_is_terminated()? {
                if text.len() > MAX_NUMBER_LEN {
                    return Err(self.error_at(self.line, col, "Float is too long."));
                }
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.error_at(self.line, col, "Expected a float."))?;
                if value < lo || value > hi {
                    return Err(self.error_at(
                        self.line,
                        col,
                        format!("Expected a value from {lo} to {hi}."),
                    ));
                }
                return Ok(value);
            }
        }
        Err(self.error_at(self.line, col, "Expected a float."))
    }

    /// Read a double-quoted string, returning its contents.
    pub fn read_string(&mut self) -> ParseResult<String> {
        let mut col = self.column;
        if self.skip_whitespace()? {
            col = self.column;
            if self.current() == b'"' {
                self.out_pos += 1;
                let mut bytes = Vec::new();
                loop {
                    let Some(ch) = self.peek()? else {
                        self.column += 1 + bytes.len() as u32;
                        return Err(
                            self.error_at(self.line, col, "Unterminated string at end of input.")
                        );
                    };
                    self.out_pos += 1;
                    match ch {
                        b'"' => break,
                        b'\n' => {
                            return Err(self.error_at(
                                self.line,
                                col,
                                "Unterminated string at end of line.",
                            ))
                        }
                        _ => bytes.push(ch),
                    }
                }
                self.column += 2 + bytes.len() as u32;
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
        }
        Err(self.error_at(self.line, col, "Expected a string."))
    }

    /// Consume the operator `op`.
    pub fn read_operator(&mut self, op: &str) -> ParseResult<()> {
        let mut col = self.column;
        if self.skip_whitespace()? {
            col = self.column;
            let mut matched = 0;
            for b in op.bytes() {
                if self.peek()? != Some(b) {
                    break;
                }
                self.out_pos += 1;
                matched += 1;
            }
            self.column += matched as u32;
            if matched == op.len() {
                return Ok(());
            }
        }
        Err(self.error_at(self.line, col, format!("Expected '{op}' operator.")))
    }

    /// Consume `op` if it is next, returning whether it was.
    pub fn eat_operator(&mut self, op: &str) -> ParseResult<bool> {
        if self.is_operator(op)? {
            self.read_operator(op)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

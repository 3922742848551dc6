//! Character cursor and numeric literal scanner.
//!
//! The cursor is shared between the tokenizer and the expansion engine: the
//! expander positions it just after an opening marker, lets the parser
//! consume exactly one multi-expression, then continues scanning from where
//! the parser stopped.
//!
//! Numeric literal typing:
//!
//! | Form | Suffix | Type |
//! |------|--------|------|
//! | integer | none | `int`, else `long`, else `ulong` |
//! | integer | `l` | `long` (or `ulong` when too large) |
//! | integer | `u` | `uint` (or `ulong` when too large) |
//! | integer | `ul` / `lu` | `ulong` |
//! | any | `f` | `float` |
//! | any | `d` | `double` |
//! | any | `m` | `decimal` |
//! | fraction/exponent | none | `double` |
//!
//! Suffixes are case-insensitive; `0x` selects a hexadecimal body and the
//! suffix rules still apply.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::value::Value;
use crate::error::ParseError;

pub struct Cursor<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Cursor {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    /// The full text under the cursor.
    pub fn source(&self) -> &'a str {
        self.src
    }

    /// Current offset, in characters.
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.chars.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Look `n` characters past the current one.
    pub fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    pub fn read(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Consume `c` if it is next.
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// True when the text at the cursor starts with `s`.
    pub fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Characters from `start` up to the cursor.
    pub fn slice_from(&self, start: usize) -> String {
        self.chars[start.min(self.pos)..self.pos].iter().collect()
    }

    /// Skip whitespace, `// line` and `/* block */` comments.
    pub fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.read() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.pos += 2;
                    while !self.is_eof() && !self.starts_with("*/") {
                        self.pos += 1;
                    }
                    self.set_pos(self.pos + 2);
                }
                _ => return,
            }
        }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(message, offset).with_source(self.src)
    }

    fn eat_digits(&mut self, radix: u32) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_digit(radix)) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Scan a numeric literal at the cursor.
    ///
    /// Returns `Ok(None)` with the cursor unchanged when no literal starts
    /// here.  A literal that starts but is malformed is an error.
    pub fn read_number(&mut self) -> Result<Option<Value>, ParseError> {
        let start = self.pos;

        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let body_start = self.pos;

        let hex = self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X'));
        let mut real = false;
        if hex {
            self.pos += 2;
            if self.eat_digits(16) == 0 {
                return Err(self.error("invalid hexadecimal literal", start));
            }
        } else {
            let int_digits = self.eat_digits(10);
            let mut frac_digits = 0;
            if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
                frac_digits = self.eat_digits(10);
                real = true;
            }
            if int_digits == 0 && frac_digits == 0 {
                self.pos = start;
                return Ok(None);
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                self.pos += 1;
                if matches!(self.peek(), Some('+' | '-')) {
                    self.pos += 1;
                }
                if self.eat_digits(10) == 0 {
                    return Err(self.error("exponent has no digits", start));
                }
                real = true;
            }
        }
        let body = self.slice_from(body_start);

        let suffix_start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let suffix = self.slice_from(suffix_start).to_ascii_lowercase();
        if self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(self.error("malformed numeric literal", start));
        }

        let value = if real {
            real_literal(&body, negative, &suffix)
        } else {
            let digits = if hex { &body[2..] } else { &body[..] };
            let radix = if hex { 16 } else { 10 };
            match u128::from_str_radix(digits, radix) {
                Ok(magnitude) => integer_literal(magnitude, negative, &suffix),
                Err(_) => Err("integral constant is too large"),
            }
        };
        value
            .map(Some)
            .map_err(|msg| self.error(format!("{msg}: '{}'", self.slice_from(start)), start))
    }
}

fn real_literal(body: &str, negative: bool, suffix: &str) -> Result<Value, &'static str> {
    let text = if negative { format!("-{body}") } else { body.to_owned() };
    match suffix {
        "" | "d" => text.parse().map(Value::F64).map_err(|_| "invalid real literal"),
        "f" => text.parse().map(Value::F32).map_err(|_| "invalid real literal"),
        "m" => Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map(Value::Decimal)
            .map_err(|_| "invalid decimal literal"),
        "l" | "u" | "ul" | "lu" => Err("integer suffix on a real literal"),
        _ => Err("invalid numeric suffix"),
    }
}

fn integer_literal(magnitude: u128, negative: bool, suffix: &str) -> Result<Value, &'static str> {
    let n: i128 = if negative {
        -(i128::try_from(magnitude).map_err(|_| "integral constant is too large")?)
    } else {
        i128::try_from(magnitude).map_err(|_| "integral constant is too large")?
    };
    let too_large = "integral constant is too large";
    match suffix {
        "" => i32::try_from(n)
            .map(Value::I32)
            .or_else(|_| i64::try_from(n).map(Value::I64))
            .or_else(|_| u64::try_from(n).map(Value::U64))
            .map_err(|_| too_large),
        "l" => i64::try_from(n)
            .map(Value::I64)
            .or_else(|_| u64::try_from(n).map(Value::U64))
            .map_err(|_| too_large),
        "u" => u32::try_from(n)
            .map(Value::U32)
            .or_else(|_| u64::try_from(n).map(Value::U64))
            .map_err(|_| too_large),
        "ul" | "lu" => u64::try_from(n).map(Value::U64).map_err(|_| too_large),
        "f" => Ok(Value::F32(n as f32)),
        "d" => Ok(Value::F64(n as f64)),
        "m" => Decimal::try_from_i128_with_scale(n, 0)
            .map(Value::Decimal)
            .map_err(|_| too_large),
        _ => Err("invalid numeric suffix"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn num(src: &str) -> Value {
        Cursor::new(src).read_number().unwrap().unwrap()
    }

    #[test]
    fn hex_and_suffixes() {
        assert_eq!(num("0x22"), Value::I32(34));
        assert_eq!(num("0x22l"), Value::I64(34));
        assert_eq!(num("0x500ul"), Value::U64(0x500));
        assert_eq!(num("0x500l"), Value::I64(0x500));
        assert_eq!(num("0x500LU"), Value::U64(0x500));
        assert_eq!(num("7u"), Value::U32(7));
    }

    #[test]
    fn real_literals() {
        assert_eq!(num("500.12m"), Value::Decimal(Decimal::from_str("500.12").unwrap()));
        assert_eq!(num("500.12f"), Value::F32(500.12));
        assert_eq!(num("1.5"), Value::F64(1.5));
        assert_eq!(num("1e3"), Value::F64(1000.0));
        assert_eq!(num("2d"), Value::F64(2.0));
    }

    #[test]
    fn integer_widening() {
        assert_eq!(num("2147483647"), Value::I32(i32::MAX));
        assert_eq!(num("2147483648"), Value::I64(2_147_483_648));
        assert_eq!(num("18446744073709551615"), Value::U64(u64::MAX));
        assert_eq!(num("-5"), Value::I32(-5));
    }

    #[test]
    fn no_literal_leaves_cursor_alone() {
        let mut c = Cursor::new("abc");
        assert_eq!(c.read_number().unwrap(), None);
        assert_eq!(c.pos(), 0);
        let mut c = Cursor::new("-x");
        assert_eq!(c.read_number().unwrap(), None);
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn malformed_literals_are_errors() {
        for src in ["0x", "12abc", "1.5q", "1e", "1.5l", "99999999999999999999999"] {
            assert!(Cursor::new(src).read_number().is_err(), "{src} should fail");
        }
    }

    #[test]
    fn stops_before_member_dot() {
        let mut c = Cursor::new("12.ToString()");
        assert_eq!(c.read_number().unwrap(), Some(Value::I32(12)));
        assert_eq!(c.peek(), Some('.'));
    }

    #[test]
    fn skips_comments() {
        let mut c = Cursor::new("  // line\n /* block */ x");
        c.skip_whitespace();
        assert_eq!(c.read(), Some('x'));
        assert_eq!(c.read(), None);
    }
}

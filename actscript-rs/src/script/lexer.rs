//! On-demand tokenizer over a [`Cursor`].
//!
//! Tokens are produced one at a time so the parser can stop in the middle
//! of a larger text (expansion markers) and hand the cursor back positioned
//! right after the last consumed token.

use super::cursor::Cursor;
use super::value::Value;
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    /// `$name`
    Var(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,

    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    AndAnd,
    OrOr,
    Question,
    QuestionQuestion,
    Colon,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,

    Eof,
}

impl Token {
    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(v) => format!("number {v}"),
            Token::Str(s) => format!("string '{s}'"),
            Token::Ident(s) => format!("'{s}'"),
            Token::Var(s) => format!("'${s}'"),
            Token::Eof => "end of expression".into(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Tilde => "~",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Question => "?",
            Token::QuestionQuestion => "??",
            Token::Colon => ":",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Dot => ".",
            _ => "?",
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub struct Lexer<'c, 'a> {
    cursor: &'c mut Cursor<'a>,
    /// Lookahead token with its start offset.
    peeked: Option<(Token, usize)>,
    /// Start offset of the most recently returned token.
    last_start: usize,
}

impl<'c, 'a> Lexer<'c, 'a> {
    pub fn new(cursor: &'c mut Cursor<'a>) -> Self {
        let last_start = cursor.pos();
        Lexer {
            cursor,
            peeked: None,
            last_start,
        }
    }

    pub fn source(&self) -> &'a str {
        self.cursor.source()
    }

    /// Offset of the token that [`peek`](Self::peek) would return.
    pub fn offset(&mut self) -> usize {
        match &self.peeked {
            Some((_, start)) => *start,
            None => {
                self.cursor.skip_whitespace();
                self.cursor.pos()
            }
        }
    }

    /// Offset of the token last returned by [`next`](Self::next).
    pub fn last_offset(&self) -> usize {
        self.last_start
    }

    pub fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.peeked.is_none() {
            let start = self.offset();
            let tok = self.scan()?;
            self.peeked = Some((tok, start));
        }
        match &self.peeked {
            Some((tok, _)) => Ok(tok),
            None => Err(ParseError::new("lexer lost its lookahead", self.cursor.pos())),
        }
    }

    pub fn next(&mut self) -> Result<Token, ParseError> {
        match self.peeked.take() {
            Some((tok, start)) => {
                self.last_start = start;
                Ok(tok)
            }
            None => {
                self.last_start = self.offset();
                self.scan()
            }
        }
    }

    /// Consume the next token if it equals `tok`.
    pub fn eat(&mut self, tok: &Token) -> Result<bool, ParseError> {
        if self.peek()? == tok {
            self.peeked = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Hand the cursor back, rewinding over any unconsumed lookahead.
    pub fn finish(self) -> usize {
        if let Some((_, start)) = self.peeked {
            self.cursor.set_pos(start);
        }
        self.cursor.pos()
    }

    /// Backtrack to an offset previously returned by [`offset`](Self::offset).
    pub fn rewind(&mut self, pos: usize) {
        self.peeked = None;
        self.cursor.set_pos(pos);
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(message, offset).with_source(self.cursor.source())
    }

    fn scan(&mut self) -> Result<Token, ParseError> {
        self.cursor.skip_whitespace();
        let start = self.cursor.pos();
        let Some(c) = self.cursor.peek() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit()
            || (c == '.' && self.cursor.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return match self.cursor.read_number()? {
                Some(v) => Ok(Token::Number(v)),
                None => Err(self.error("malformed number", start)),
            };
        }
        if is_ident_start(c) {
            return Ok(Token::Ident(self.read_ident()));
        }
        if c == '\'' || c == '"' {
            return self.read_string();
        }

        self.cursor.read();
        let two = |lx: &mut Self, next: char, yes: Token, no: Token| {
            if lx.cursor.eat(next) {
                yes
            } else {
                no
            }
        };
        let tok = match c {
            '$' => {
                if !self.cursor.peek().is_some_and(is_ident_start) {
                    return Err(self.error("expected a variable name after '$'", start));
                }
                Token::Var(self.read_ident())
            }
            '+' => two(self, '=', Token::PlusAssign, Token::Plus),
            '-' => two(self, '=', Token::MinusAssign, Token::Minus),
            '*' => two(self, '=', Token::StarAssign, Token::Star),
            '/' => two(self, '=', Token::SlashAssign, Token::Slash),
            '%' => Token::Percent,
            '~' => Token::Tilde,
            '^' => Token::Caret,
            '!' => two(self, '=', Token::NotEq, Token::Bang),
            '=' => two(self, '=', Token::EqEq, Token::Assign),
            '&' => two(self, '&', Token::AndAnd, Token::Amp),
            '|' => two(self, '|', Token::OrOr, Token::Pipe),
            '?' => two(self, '?', Token::QuestionQuestion, Token::Question),
            ':' => Token::Colon,
            '<' => {
                if self.cursor.eat('<') {
                    Token::Shl
                } else {
                    two(self, '=', Token::Le, Token::Lt)
                }
            }
            '>' => {
                if self.cursor.eat('>') {
                    Token::Shr
                } else {
                    two(self, '=', Token::Ge, Token::Gt)
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' => Token::Dot,
            other => return Err(self.error(format!("unexpected character '{other}'"), start)),
        };
        Ok(tok)
    }

    fn read_ident(&mut self) -> String {
        let start = self.cursor.pos();
        while self.cursor.peek().is_some_and(is_ident_char) {
            self.cursor.read();
        }
        self.cursor.slice_from(start)
    }

    fn read_string(&mut self) -> Result<Token, ParseError> {
        let start = self.cursor.pos();
        let quote = self.cursor.read();
        let mut s = String::new();
        loop {
            match self.cursor.read() {
                None => return Err(self.error("unterminated string literal", start)),
                Some(c) if Some(c) == quote => return Ok(Token::Str(s)),
                Some('\\') => {
                    let esc = self
                        .cursor
                        .read()
                        .ok_or_else(|| self.error("unterminated string literal", start))?;
                    match esc {
                        'n' => s.push('\n'),
                        'r' => s.push('\r'),
                        't' => s.push('\t'),
                        '0' => s.push('\0'),
                        'u' => {
                            let at = self.cursor.pos();
                            let hex: String = (0..4).filter_map(|_| self.cursor.read()).collect();
                            let ch = u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| self.error("invalid \\u escape", at))?;
                            s.push(ch);
                        }
                        other => s.push(other),
                    }
                }
                Some(c) => s.push(c),
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut cursor = Cursor::new(src);
        let mut lx = Lexer::new(&mut cursor);
        let mut out = Vec::new();
        loop {
            let t = lx.next().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn operators_use_longest_match() {
        assert_eq!(
            tokens("a<<=b ?? c||d"),
            vec![
                Token::Ident("a".into()),
                Token::Shl,
                Token::Assign,
                Token::Ident("b".into()),
                Token::QuestionQuestion,
                Token::Ident("c".into()),
                Token::OrOr,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn variables_and_strings() {
        assert_eq!(
            tokens(r#"$v_t == 'B' + "x\ty""#),
            vec![
                Token::Var("v_t".into()),
                Token::EqEq,
                Token::Str("B".into()),
                Token::Plus,
                Token::Str("x\ty".into()),
            ]
        );
    }

    #[test]
    fn finish_rewinds_lookahead() {
        let mut cursor = Cursor::new("x } tail");
        let mut lx = Lexer::new(&mut cursor);
        assert_eq!(lx.next().unwrap(), Token::Ident("x".into()));
        assert_eq!(lx.peek().unwrap(), &Token::RBrace);
        let pos = lx.finish();
        assert_eq!(pos, 2);
        assert_eq!(cursor.peek(), Some('}'));
    }

    #[test]
    fn bad_input_reports_offset() {
        let mut cursor = Cursor::new("1 # 2");
        let mut lx = Lexer::new(&mut cursor);
        lx.next().unwrap();
        let err = lx.next().unwrap_err();
        assert_eq!(err.offset, 2);
        let mut cursor = Cursor::new("'open");
        assert!(Lexer::new(&mut cursor).next().is_err());
    }
}

//! Recursive-descent expression parser.
//!
//! Operator precedence (lowest → highest):
//!   assign  →  ternary  →  `??`  →  `||`  →  `&&`  →  `|`  →  `^`  →  `&`  →
//!   equality  →  relational  →  shift  →  additive  →  multiplicative  →
//!   unary / cast  →  postfix  →  primary
//!
//! Assignment, `?:` and `??` are right-associative; everything else is
//! left-associative.
//!
//! Multi-expressions (`a|b|=expr`) are parsed segment by segment straight
//! off a [`Cursor`]; inside a segment a bare `|` at nesting level zero ends
//! the segment instead of meaning bitwise or.

use super::coerce::ValueType;
use super::cursor::Cursor;
use super::expr::{Operation, Segment, TypeRef};
use super::lexer::{Lexer, Token};
use super::ops::{BinOp, UnaryOp};
use super::value::Value;
use crate::error::ParseError;

/// Parse a complete expression; trailing input is an error.
pub fn parse_expression(text: &str) -> Result<Operation, ParseError> {
    let mut cursor = Cursor::new(text);
    let mut p = Parser::new(&mut cursor, false);
    let op = p.parse_expr()?;
    p.expect_end()?;
    Ok(op)
}

/// Parse a complete multi-expression; trailing input is an error.
pub fn parse_multi(text: &str) -> Result<Operation, ParseError> {
    let mut cursor = Cursor::new(text);
    let op = parse_multi_at(&mut cursor, &[])?;
    cursor.skip_whitespace();
    if let Some(c) = cursor.peek() {
        return Err(ParseError::new(format!("unexpected '{c}'"), cursor.pos()).with_source(text));
    }
    Ok(op)
}

fn skip_blanks(cursor: &mut Cursor<'_>) {
    while cursor.peek().is_some_and(char::is_whitespace) {
        cursor.read();
    }
}

/// Parse one multi-expression starting at the cursor.
///
/// Stops in front of the first `terminators` character (or end of input)
/// that is not part of a segment, leaving the cursor on it.
pub fn parse_multi_at(cursor: &mut Cursor<'_>, terminators: &[char]) -> Result<Operation, ParseError> {
    let ends_segment = |c: Option<char>| match c {
        None => true,
        Some(c) => c == '|' || terminators.contains(&c),
    };

    let mut segments = Vec::new();
    loop {
        skip_blanks(cursor);
        match cursor.peek() {
            Some('=') => {
                cursor.read();
                segments.push(Segment::Fallback(parse_segment_expr(cursor)?));
                break;
            }
            Some('$' | '(') => segments.push(Segment::Expr(parse_segment_expr(cursor)?)),
            c if ends_segment(c) => segments.push(Segment::Empty),
            _ => {
                let start = cursor.pos();
                while !ends_segment(cursor.peek()) {
                    cursor.read();
                }
                let name = cursor.slice_from(start).trim_end().to_owned();
                segments.push(Segment::Name(name));
            }
        }
        skip_blanks(cursor);
        if !cursor.eat('|') {
            break;
        }
    }
    Ok(Operation::Multi(segments))
}

fn parse_segment_expr(cursor: &mut Cursor<'_>) -> Result<Operation, ParseError> {
    let mut p = Parser::new(cursor, true);
    let op = p.parse_expr()?;
    p.lx.finish();
    Ok(op)
}

struct Parser<'c, 'a> {
    lx: Lexer<'c, 'a>,
    /// A bare `|` ends a multi-expression segment.
    multi: bool,
    /// Open `(`, `[` and `{` around the current position.
    nesting: usize,
}

impl<'c, 'a> Parser<'c, 'a> {
    fn new(cursor: &'c mut Cursor<'a>, multi: bool) -> Self {
        Parser {
            lx: Lexer::new(cursor),
            multi,
            nesting: 0,
        }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(message, offset).with_source(self.lx.source())
    }

    fn unexpected(&mut self, expected: &str) -> ParseError {
        let offset = self.lx.offset();
        let found = match self.lx.peek() {
            Ok(t) => t.describe(),
            Err(e) => return e,
        };
        self.error(format!("expected {expected} but found {found}"), offset)
    }

    fn expect(&mut self, tok: Token) -> Result<(), ParseError> {
        if self.lx.eat(&tok)? {
            Ok(())
        } else {
            let what = format!("'{}'", tok.describe().trim_matches('\''));
            Err(self.unexpected(&what))
        }
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        if self.lx.peek()? == &Token::Eof {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.lx.peek()? {
            Token::Ident(_) => match self.lx.next()? {
                Token::Ident(s) => Ok(s),
                _ => Err(self.unexpected("a name")),
            },
            _ => Err(self.unexpected("a name")),
        }
    }

    fn enter(&mut self) {
        self.nesting += 1;
    }

    fn leave(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Operation, ParseError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Operation, ParseError> {
        let start = self.lx.offset();
        let lhs = self.parse_ternary()?;
        let op = match self.lx.peek()? {
            Token::Assign => None,
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            _ => return Ok(lhs),
        };
        let name = match lhs {
            Operation::Var(name) => name,
            Operation::Path(parts) => parts.join("."),
            _ => return Err(self.error("assignment target must be a variable", start)),
        };
        self.lx.next()?;
        let value = self.parse_assign()?;
        Ok(Operation::Assign {
            name,
            op,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Operation, ParseError> {
        let cond = self.parse_coalesce()?;
        if !self.lx.eat(&Token::Question)? {
            return Ok(cond);
        }
        self.enter();
        let then = self.parse_ternary()?;
        self.expect(Token::Colon)?;
        self.leave();
        let otherwise = self.parse_ternary()?;
        Ok(Operation::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_coalesce(&mut self) -> Result<Operation, ParseError> {
        let lhs = self.parse_or()?;
        if self.lx.eat(&Token::QuestionQuestion)? {
            let rhs = self.parse_coalesce()?;
            return Ok(Operation::Coalesce(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Operation, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.lx.eat(&Token::OrOr)? {
            let rhs = self.parse_and()?;
            lhs = Operation::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Operation, ParseError> {
        let mut lhs = self.parse_bitor()?;
        while self.lx.eat(&Token::AndAnd)? {
            let rhs = self.parse_bitor()?;
            lhs = Operation::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// One left-associative binary level over `ops`, with `next` as the
    /// operand parser.
    fn binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Operation, ParseError>,
    ) -> Result<Operation, ParseError> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.lx.eat(tok)? {
                    let rhs = next(self)?;
                    lhs = Operation::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_bitor(&mut self) -> Result<Operation, ParseError> {
        if self.multi && self.nesting == 0 {
            return self.parse_bitxor();
        }
        self.binary_level(&[(Token::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(&[(Token::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(&[(Token::Amp, BinOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(
            &[(Token::EqEq, BinOp::Eq), (Token::NotEq, BinOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(
            &[
                (Token::Lt, BinOp::Lt),
                (Token::Le, BinOp::Le),
                (Token::Gt, BinOp::Gt),
                (Token::Ge, BinOp::Ge),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(
            &[(Token::Shl, BinOp::Shl), (Token::Shr, BinOp::Shr)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Operation, ParseError> {
        self.binary_level(
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::Percent, BinOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Operation, ParseError> {
        let op = match self.lx.peek()? {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Tilde => UnaryOp::BitNot,
            Token::LParen => {
                if let Some(cast) = self.try_cast()? {
                    return Ok(cast);
                }
                return self.parse_postfix();
            }
            _ => return self.parse_postfix(),
        };
        self.lx.next()?;
        let operand = self.parse_unary()?;
        Ok(Operation::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `(Type)expr` / `(Type[])expr`, or `None` (lexer rewound) when the
    /// parenthesis is not a cast.
    fn try_cast(&mut self) -> Result<Option<Operation>, ParseError> {
        let save = self.lx.offset();
        self.lx.next()?;
        if !matches!(self.lx.peek()?, Token::Ident(_)) {
            self.lx.rewind(save);
            return Ok(None);
        }
        let name = self.type_name()?;

        let mut array = false;
        if self.lx.eat(&Token::LBracket)? {
            if !self.lx.eat(&Token::RBracket)? {
                self.lx.rewind(save);
                return Ok(None);
            }
            array = true;
        }
        if !self.lx.eat(&Token::RParen)? {
            if array {
                return Err(self.unexpected("')' after array cast type"));
            }
            self.lx.rewind(save);
            return Ok(None);
        }

        let keyword = array || ValueType::builtin(&name).is_some();
        let starts_operand = match self.lx.peek()? {
            Token::Number(_)
            | Token::Str(_)
            | Token::Var(_)
            | Token::Ident(_)
            | Token::LParen
            | Token::LBrace
            | Token::Bang
            | Token::Tilde => true,
            Token::Minus | Token::Plus => keyword,
            _ => false,
        };
        if !starts_operand {
            if keyword {
                return Err(self.unexpected(&format!("an operand for the cast to '{name}'")));
            }
            self.lx.rewind(save);
            return Ok(None);
        }

        let operand = self.parse_unary()?;
        Ok(Some(Operation::Cast {
            ty: TypeRef { name, array },
            operand: Box::new(operand),
        }))
    }

    /// `Name` or `Dotted.Type.Name`.
    fn type_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_ident()?;
        while self.lx.eat(&Token::Dot)? {
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_args(&mut self) -> Result<Vec<Operation>, ParseError> {
        self.expect(Token::LParen)?;
        self.enter();
        let args = self.parse_list(Token::RParen)?;
        self.leave();
        Ok(args)
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Operation>, ParseError> {
        let mut items = Vec::new();
        if self.lx.eat(&close)? {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.lx.eat(&Token::Comma)? {
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    fn parse_postfix(&mut self) -> Result<Operation, ParseError> {
        let mut op = self.parse_primary()?;
        loop {
            if self.lx.eat(&Token::Dot)? {
                let name = self.expect_ident()?;
                if self.lx.peek()? == &Token::LParen {
                    let args = self.parse_args()?;
                    op = Operation::MethodCall {
                        target: Box::new(op),
                        name,
                        args,
                    };
                } else {
                    op = match op {
                        Operation::Var(v) => Operation::Path(vec![v, name]),
                        Operation::Path(mut parts) => {
                            parts.push(name);
                            Operation::Path(parts)
                        }
                        other => Operation::Member {
                            target: Box::new(other),
                            name,
                        },
                    };
                }
            } else if self.lx.eat(&Token::LBracket)? {
                self.enter();
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                self.leave();
                op = Operation::Index {
                    target: Box::new(op),
                    index: Box::new(index),
                };
            } else {
                return Ok(op);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Operation, ParseError> {
        let offset = self.lx.offset();
        match self.lx.peek()? {
            Token::Number(_) | Token::Str(_) | Token::Var(_) | Token::Ident(_) => {}
            Token::LParen => {
                self.lx.next()?;
                self.enter();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                self.leave();
                return Ok(inner);
            }
            Token::LBrace => {
                self.lx.next()?;
                self.enter();
                let items = self.parse_list(Token::RBrace)?;
                self.leave();
                return Ok(Operation::Array { elem: None, items });
            }
            _ => return Err(self.unexpected("an operand")),
        }

        match self.lx.next()? {
            Token::Number(v) => Ok(Operation::Literal(v)),
            Token::Str(s) => Ok(Operation::Literal(Value::Str(s))),
            Token::Var(name) => Ok(Operation::Var(name)),
            Token::Ident(name) => self.parse_ident(name),
            _ => Err(self.error("unexpected token", offset)),
        }
    }

    fn parse_ident(&mut self, name: String) -> Result<Operation, ParseError> {
        match name.as_str() {
            "true" => return Ok(Operation::Literal(Value::Bool(true))),
            "false" => return Ok(Operation::Literal(Value::Bool(false))),
            "null" => return Ok(Operation::Literal(Value::Null)),
            "new" => return self.parse_new(),
            _ => {}
        }
        match self.lx.peek()? {
            Token::LParen => {
                let args = self.parse_args()?;
                Ok(Operation::Call { name, args })
            }
            Token::Dot => {
                self.lx.next()?;
                let member = self.expect_ident()?;
                let args = if self.lx.peek()? == &Token::LParen {
                    Some(self.parse_args()?)
                } else {
                    None
                };
                Ok(Operation::Static {
                    type_name: name,
                    member,
                    args,
                })
            }
            _ => Ok(Operation::Var(name)),
        }
    }

    /// After `new`: `[]{…}`, `T[]{…}` or `T[n]`.
    fn parse_new(&mut self) -> Result<Operation, ParseError> {
        let elem = match self.lx.peek()? {
            Token::LBracket => None,
            Token::Ident(_) => Some(self.type_name()?),
            _ => return Err(self.unexpected("an array type after 'new'")),
        };
        self.expect(Token::LBracket)?;
        self.enter();
        if self.lx.eat(&Token::RBracket)? {
            self.leave();
            self.expect(Token::LBrace)?;
            self.enter();
            let items = self.parse_list(Token::RBrace)?;
            self.leave();
            return Ok(Operation::Array {
                elem: elem.map(|name| TypeRef { name, array: false }),
                items,
            });
        }
        let Some(name) = elem else {
            return Err(self.unexpected("']' in 'new[]'"));
        };
        let len = self.parse_expr()?;
        self.expect(Token::RBracket)?;
        self.leave();
        Ok(Operation::NewArray {
            elem: TypeRef { name, array: false },
            len: Box::new(len),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: Value) -> Box<Operation> {
        Box::new(Operation::Literal(v))
    }

    #[test]
    fn trailing_tokens_fail() {
        assert!(parse_expression("1 2 +").is_err());
        assert!(parse_expression("(1 2 +)").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("{1, 2").is_err());
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn error_names_the_offset() {
        let err = parse_expression("1 2 +").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.to_string().contains("in '1 2 +'"));
    }

    #[test]
    fn precedence() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            Operation::Binary {
                op: BinOp::Add,
                lhs: lit(Value::I32(1)),
                rhs: Box::new(Operation::Binary {
                    op: BinOp::Mul,
                    lhs: lit(Value::I32(2)),
                    rhs: lit(Value::I32(3)),
                }),
            }
        );
        assert!(matches!(
            parse_expression("$a ?? $b ? 1 : 2").unwrap(),
            Operation::Ternary { .. }
        ));
    }

    #[test]
    fn casts_versus_parentheses() {
        assert!(matches!(parse_expression("(int)-1").unwrap(), Operation::Cast { .. }));
        assert!(matches!(parse_expression("(x)-1").unwrap(), Operation::Binary { .. }));
        assert!(matches!(parse_expression("(Color)$c").unwrap(), Operation::Cast { .. }));
        assert!(matches!(parse_expression("(a[0])").unwrap(), Operation::Index { .. }));
        assert!(parse_expression("(int)").is_err());
        assert!(parse_expression("(int[)1").is_err());
    }

    #[test]
    fn assignment_needs_a_variable() {
        assert!(matches!(parse_expression("$a = $b = 1").unwrap(), Operation::Assign { .. }));
        assert!(parse_expression("1 = 2").is_err());
    }

    #[test]
    fn new_array_forms() {
        assert!(matches!(
            parse_expression("new[]{1,2}").unwrap(),
            Operation::Array { elem: None, .. }
        ));
        assert!(matches!(
            parse_expression("new int[]{}").unwrap(),
            Operation::Array { elem: Some(_), .. }
        ));
        assert!(matches!(parse_expression("new int[3]").unwrap(), Operation::NewArray { .. }));
        assert!(parse_expression("new 5").is_err());
    }

    #[test]
    fn static_and_calls() {
        assert!(matches!(
            parse_expression("Math.Max(1, 2)").unwrap(),
            Operation::Static { args: Some(_), .. }
        ));
        assert!(matches!(
            parse_expression("CallIsolation.High").unwrap(),
            Operation::Static { args: None, .. }
        ));
        assert!(matches!(parse_expression("strlen('x')").unwrap(), Operation::Call { .. }));
    }

    #[test]
    fn multi_stops_at_terminator() {
        let mut cursor = Cursor::new("a | b } rest");
        let op = parse_multi_at(&mut cursor, &['}']).unwrap();
        assert_eq!(
            op,
            Operation::Multi(vec![Segment::Name("a".into()), Segment::Name("b".into())])
        );
        assert_eq!(cursor.peek(), Some('}'));

        let mut cursor = Cursor::new("$x[0]]tail");
        parse_multi_at(&mut cursor, &[']']).unwrap();
        assert_eq!(cursor.peek(), Some(']'));
    }

    #[test]
    fn multi_expression_segments_keep_inner_pipes() {
        let op = parse_multi("($a | 1)|=2").unwrap();
        let Operation::Multi(segs) = op else { panic!("not a multi") };
        assert_eq!(segs.len(), 2);
        assert!(matches!(&segs[0], Segment::Expr(Operation::Binary { op: BinOp::BitOr, .. })));
        assert!(matches!(&segs[1], Segment::Fallback(_)));
    }
}

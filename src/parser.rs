//! SML parser: recursive descent over the lexer's token stream.
//!
//! The parser recovers from value-level mistakes by substituting a neutral
//! value and recording an error, and abandons the current message on
//! structural mistakes. Any recorded error discards every parsed message at
//! the end, so a half-valid AST never escapes. Warnings (missing direction,
//! corrected ellipsis index) keep the messages.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::item::{Item, ItemError, MAX_BYTE_SIZE};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::message::{DataMessage, Direction, WaitBit};
use crate::value::Value;

/// A localized parser diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub col: u32,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ln {}, Col {}: {}", self.line, self.col, self.text)
    }
}

/// Result of parsing an SML input: the messages (empty whenever any error
/// was recorded) and the diagnostics in scan order.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub messages: Vec<DataMessage>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Parses SML text into data messages.
pub fn parse(input: &str) -> ParseOutput {
    let mut parser = Parser::new(input);
    while parser.peek().kind != TokenKind::Eof {
        if !parser.parse_message() {
            break;
        }
    }
    debug!(
        messages = parser.messages.len(),
        errors = parser.errors.len(),
        warnings = parser.warnings.len(),
        "parsed SML input"
    );
    if parser.errors.is_empty() {
        ParseOutput {
            messages: parser.messages,
            errors: parser.errors,
            warnings: parser.warnings,
        }
    } else {
        ParseOutput {
            messages: Vec::new(),
            errors: parser.errors,
            warnings: parser.warnings,
        }
    }
}

/// Failure of a data item body: `Fatal` when diagnostics were already
/// recorded and the message must be abandoned, `Factory` when the item
/// constructor rejected its input.
enum BodyFail {
    Fatal,
    Factory(ItemError),
}

impl From<ItemError> for BodyFail {
    fn from(e: ItemError) -> BodyFail {
        BodyFail::Factory(e)
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
    variable_names: HashSet<String>,
    ellipsis_count: usize,
    messages: Vec<DataMessage>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Parser<'a> {
        Parser {
            lexer: Lexer::new(input),
            lookahead: None,
            variable_names: HashSet::new(),
            ellipsis_count: 0,
            messages: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Next token without consuming it; comment tokens are filtered out.
    fn peek(&mut self) -> Token {
        if let Some(token) = &self.lookahead {
            return token.clone();
        }
        loop {
            let token = self.lexer.next_token();
            if token.kind != TokenKind::Comment {
                self.lookahead = Some(token.clone());
                return token;
            }
        }
    }

    fn accept_any(&mut self) -> Token {
        let token = self.peek();
        self.lookahead = None;
        token
    }

    fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek().kind == kind {
            Some(self.accept_any())
        } else {
            None
        }
    }

    fn error_at(&mut self, token: &Token, text: String) {
        self.errors.push(Diagnostic {
            line: token.line,
            col: token.col,
            text,
        });
    }

    fn warning_at(&mut self, token: &Token, text: String) {
        self.warnings.push(Diagnostic {
            line: token.line,
            col: token.col,
            text,
        });
    }

    /// Parses one message. Returns false when parsing must stop.
    fn parse_message(&mut self) -> bool {
        self.variable_names.clear();
        self.ellipsis_count = 0;

        let (stream, function) = match self.parse_stream_function() {
            Some(codes) => codes,
            None => return false,
        };

        let mut wait_bit = WaitBit::False;
        if let Some(token) = self.accept(TokenKind::WaitBit) {
            if token.text == "W" {
                wait_bit = WaitBit::True;
                if function % 2 == 0 {
                    wait_bit = WaitBit::False;
                    self.error_at(
                        &token,
                        "wait bit cannot be true on reply message (function code is even)"
                            .to_string(),
                    );
                }
            } else {
                wait_bit = WaitBit::Optional;
            }
        }

        let direction = match self.accept(TokenKind::Direction) {
            Some(token) => token.text.parse().unwrap_or(Direction::Bidirectional),
            None => {
                let token = self.peek();
                self.warning_at(
                    &token,
                    "missing message direction, \"H<->E\" will be used".to_string(),
                );
                Direction::Bidirectional
            }
        };

        let name = self
            .accept(TokenKind::MessageName)
            .map(|token| token.text)
            .unwrap_or_default();

        let item = match self.parse_message_text() {
            Some(item) => item,
            None => return false,
        };

        let end = match self.accept(TokenKind::MessageEnd) {
            Some(token) => token,
            None => {
                let token = self.peek();
                self.error_at(
                    &token,
                    format!("expected message end character '.', found {:?}", token.text),
                );
                return false;
            }
        };

        match DataMessage::new(&name, stream, function, wait_bit, direction, item) {
            Ok(message) => {
                self.messages.push(message);
                true
            }
            Err(e) => {
                self.error_at(&end, e.to_string());
                false
            }
        }
    }

    /// Parses the stream-function token; range violations substitute 0 so
    /// parsing can continue.
    fn parse_stream_function(&mut self) -> Option<(u8, u8)> {
        let token = match self.accept(TokenKind::StreamFunction) {
            Some(token) => token,
            None => {
                let token = self.peek();
                self.error_at(
                    &token,
                    format!("expected stream function, found {:?}", token.text),
                );
                return None;
            }
        };

        let body = &token.text[1..];
        let (stream_digits, function_digits) = body.split_once('F').unwrap_or((body, "0"));
        let mut stream = parse_saturating(stream_digits) as u64;
        let mut function = parse_saturating(function_digits) as u64;
        if stream >= 128 {
            self.error_at(
                &token,
                "stream code range overflow, should be in range of [0, 128)".to_string(),
            );
            stream = 0;
        }
        if function >= 256 {
            self.error_at(
                &token,
                "function code range overflow, should be in range of [0, 256)".to_string(),
            );
            function = 0;
        }
        Some((stream as u8, function as u8))
    }

    fn parse_message_text(&mut self) -> Option<Item> {
        let token = self.peek();
        match token.kind {
            TokenKind::MessageEnd => Some(Item::Empty),
            TokenKind::LeftAngle => self.parse_data_item(),
            _ => {
                self.error_at(&token, format!("expected '<' or '.', found {:?}", token.text));
                None
            }
        }
    }

    fn parse_data_item(&mut self) -> Option<Item> {
        let open = match self.accept(TokenKind::LeftAngle) {
            Some(token) => token,
            None => {
                let token = self.peek();
                self.error_at(&token, format!("expected '<', found {:?}", token.text));
                return None;
            }
        };

        let item_type = match self.accept(TokenKind::DataItemType) {
            Some(token) => token.text,
            None => {
                let token = self.peek();
                self.error_at(&token, format!("invalid data item type: {:?}", token.text));
                return None;
            }
        };

        let mut size = None;
        let next = self.peek();
        if next.kind == TokenKind::DataItemSize {
            size = Some(parse_size_bounds(self.accept_any()));
        } else if next.kind == TokenKind::Error {
            self.error_at(&next, format!("syntax error: {}", next.text));
            return None;
        }
        let (min_length, max_length) = size
            .as_ref()
            .map(|(_, lo, hi)| (*lo, *hi))
            .unwrap_or((0, None));

        let result = match item_type.as_str() {
            "L" => self.parse_list(),
            "A" => self.parse_ascii(min_length, max_length),
            "B" => self.parse_binary(),
            "BOOLEAN" => self.parse_boolean(),
            "F4" => self.parse_float(4),
            "F8" => self.parse_float(8),
            "I1" => self.parse_int(1),
            "I2" => self.parse_int(2),
            "I4" => self.parse_int(4),
            "I8" => self.parse_int(8),
            "U1" => self.parse_uint(1),
            "U2" => self.parse_uint(2),
            "U4" => self.parse_uint(4),
            "U8" => self.parse_uint(8),
            _ => return None,
        };
        let item = match result {
            Ok(item) => item,
            Err(BodyFail::Fatal) => return None,
            Err(BodyFail::Factory(e)) => {
                self.error_at(&open, e.to_string());
                return None;
            }
        };

        // The size constraint applies once the body's actual size is known;
        // an ASCII variable instead inherits the bounds as fill-in limits.
        if let (Some(actual), Some((token, lo, hi))) = (item.size(), &size) {
            let out_of_range = match hi {
                Some(hi) => actual < *lo || actual > *hi,
                None => actual < *lo,
            };
            if out_of_range {
                let token = token.clone();
                self.error_at(&token, format!("data item size overflow, got size of {}", actual));
            }
        }

        match self.accept(TokenKind::RightAngle) {
            Some(_) => Some(item),
            None => {
                let token = self.peek();
                self.error_at(&token, format!("expected '>', found {:?}", token.text));
                None
            }
        }
    }

    fn parse_list(&mut self) -> Result<Item, BodyFail> {
        let mut values: Vec<Value> = Vec::new();
        loop {
            let token = self.peek();
            match token.kind {
                TokenKind::LeftAngle => match self.parse_data_item() {
                    Some(child) => values.push(Value::Item(child)),
                    None => return Err(BodyFail::Fatal),
                },
                TokenKind::Variable => {
                    let token = self.accept_any();
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Item(Item::Empty));
                    }
                }
                TokenKind::Ellipsis => {
                    let token = self.accept_any();
                    if values.is_empty() {
                        self.error_at(
                            &token,
                            "ellipsis cannot be the first item in list".to_string(),
                        );
                        return Err(BodyFail::Fatal);
                    }
                    let assigned = format!("...[{}]", self.ellipsis_count);
                    self.ellipsis_count += 1;
                    if token.text != "..." && token.text != assigned {
                        self.warning_at(
                            &token,
                            format!("wrong ellipsis count, {:?} will be used", assigned),
                        );
                    }
                    values.push(Value::Str(assigned));
                }
                TokenKind::RightAngle => return Ok(Item::list(values)?),
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!(
                            "expected child data item, variable, ellipsis, or '>', found {:?}",
                            token.text
                        ),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
    }

    /// Body tokens of a leaf item, up to (but excluding) the closing `>`.
    /// Any unexpected token is included and ends the collection.
    fn data_item_value_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Number
                | TokenKind::Bool
                | TokenKind::QuotedString
                | TokenKind::Variable => tokens.push(self.accept_any()),
                TokenKind::RightAngle => return tokens,
                _ => {
                    tokens.push(self.accept_any());
                    return tokens;
                }
            }
        }
    }

    fn parse_ascii(
        &mut self,
        min_length: usize,
        max_length: Option<usize>,
    ) -> Result<Item, BodyFail> {
        let mut literal = String::new();
        let tokens = self.data_item_value_tokens();
        for token in &tokens {
            match token.kind {
                TokenKind::QuotedString => {
                    let mut value = unquote(&token.text).to_string();
                    if let Some(c) = value.chars().find(|c| !c.is_ascii()) {
                        self.error_at(token, format!("expected ASCII characters, found {:?}", c));
                        value.clear();
                    }
                    literal.push_str(&value);
                }
                TokenKind::Number => {
                    let code = match parse_u64_prefixed(&token.text) {
                        Ok(code) => code,
                        Err(NumError::Range) => u64::MAX,
                        Err(NumError::Syntax) => {
                            self.error_at(
                                token,
                                format!("expected ASCII number code, found {:?}", token.text),
                            );
                            0
                        }
                    };
                    let code = if code > 0x7F {
                        self.error_at(
                            token,
                            format!("overflows ASCII range, found {:?}", token.text),
                        );
                        0
                    } else {
                        code
                    };
                    literal.push(code as u8 as char);
                }
                TokenKind::Variable => {
                    if tokens.len() != 1 {
                        self.error_at(
                            token,
                            "variable cannot co-exist with other literals in ASCII data item"
                                .to_string(),
                        );
                        return Err(BodyFail::Fatal);
                    }
                    if !self.variable_names.insert(token.text.clone()) {
                        self.error_at(
                            token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        let filler = "*".repeat(min_length.min(MAX_BYTE_SIZE));
                        return Ok(Item::ascii(&filler)?);
                    }
                    return Ok(Item::ascii_variable(&token.text, min_length, max_length)?);
                }
                TokenKind::Error => {
                    self.error_at(token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        token,
                        format!(
                            "expected quoted string, ASCII number code or variable, found {:?}",
                            token.text
                        ),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::ascii(&literal)?)
    }

    fn parse_binary(&mut self) -> Result<Item, BodyFail> {
        let mut values = Vec::new();
        for token in self.data_item_value_tokens() {
            match token.kind {
                TokenKind::Number => {
                    let value = match parse_i64_prefixed(&token.text) {
                        Ok(v) => v,
                        Err(NumError::Range) => i64::MAX,
                        Err(NumError::Syntax) => 0,
                    };
                    let value = if (0..256).contains(&value) {
                        value
                    } else {
                        self.error_at(
                            &token,
                            "binary value overflow, should be in range of [0, 256)".to_string(),
                        );
                        0
                    };
                    values.push(Value::Int(value));
                }
                TokenKind::Variable => {
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Int(0));
                    }
                }
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("expected number or variable, found {:?}", token.text),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::binary(values)?)
    }

    fn parse_boolean(&mut self) -> Result<Item, BodyFail> {
        let mut values = Vec::new();
        for token in self.data_item_value_tokens() {
            match token.kind {
                TokenKind::Bool => values.push(Value::Bool(token.text == "T")),
                TokenKind::Variable => {
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Bool(false));
                    }
                }
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("expected boolean value or variable, found {:?}", token.text),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::boolean(values)?)
    }

    fn parse_float(&mut self, byte_size: u8) -> Result<Item, BodyFail> {
        let mut values = Vec::new();
        for token in self.data_item_value_tokens() {
            match token.kind {
                TokenKind::Number => {
                    let value = match parse_float(&token.text, byte_size) {
                        Ok(v) => v,
                        Err(NumError::Range) => {
                            self.error_at(&token, format!("F{} range overflow", byte_size));
                            0.0
                        }
                        Err(NumError::Syntax) => {
                            self.error_at(
                                &token,
                                format!("expected float, found {:?}", token.text),
                            );
                            0.0
                        }
                    };
                    values.push(Value::Float(value));
                }
                TokenKind::Variable => {
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Float(0.0));
                    }
                }
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("expected float or variable, found {:?}", token.text),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::float(byte_size, values)?)
    }

    fn parse_int(&mut self, byte_size: u8) -> Result<Item, BodyFail> {
        let mut values = Vec::new();
        for token in self.data_item_value_tokens() {
            match token.kind {
                TokenKind::Number => {
                    let value = match parse_i64_ranged(&token.text, byte_size) {
                        Ok(v) => v,
                        Err(NumError::Range) => {
                            self.error_at(&token, format!("I{} range overflow", byte_size));
                            0
                        }
                        Err(NumError::Syntax) => {
                            self.error_at(
                                &token,
                                format!("expected integer, found {:?}", token.text),
                            );
                            0
                        }
                    };
                    values.push(Value::Int(value));
                }
                TokenKind::Variable => {
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Int(0));
                    }
                }
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("expected integer or variable, found {:?}", token.text),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::int(byte_size, values)?)
    }

    fn parse_uint(&mut self, byte_size: u8) -> Result<Item, BodyFail> {
        let mut values = Vec::new();
        for token in self.data_item_value_tokens() {
            match token.kind {
                TokenKind::Number => {
                    let value = match parse_u64_ranged(&token.text, byte_size) {
                        Ok(v) => v,
                        Err(NumError::Range) => {
                            self.error_at(&token, format!("U{} range overflow", byte_size));
                            0
                        }
                        Err(NumError::Syntax) => {
                            self.error_at(
                                &token,
                                format!("expected unsigned integer, found {:?}", token.text),
                            );
                            0
                        }
                    };
                    values.push(Value::Uint(value));
                }
                TokenKind::Variable => {
                    if self.variable_names.insert(token.text.clone()) {
                        values.push(Value::Str(token.text));
                    } else {
                        self.error_at(
                            &token,
                            format!("duplicated variable name {:?}", token.text),
                        );
                        values.push(Value::Uint(0));
                    }
                }
                TokenKind::Error => {
                    self.error_at(&token, format!("syntax error: {}", token.text));
                    return Err(BodyFail::Fatal);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("expected unsigned integer or variable, found {:?}", token.text),
                    );
                    return Err(BodyFail::Fatal);
                }
            }
        }
        Ok(Item::uint(byte_size, values)?)
    }
}

/// Size token bounds: `[n]` → (n, n), `[n..]` → (n, none), `[..m]` →
/// (0, m), `[n..m]` → (n, m). Digit runs beyond the native range saturate.
fn parse_size_bounds(token: Token) -> (Token, usize, Option<usize>) {
    let inner = &token.text[1..token.text.len() - 1];
    match inner.find("..") {
        None => {
            let n = parse_saturating(inner);
            (token, n, Some(n))
        }
        Some(i) => {
            let lo = parse_saturating(&inner[..i]);
            let hi_digits = &inner[i + 2..];
            let hi = if hi_digits.is_empty() {
                None
            } else {
                Some(parse_saturating(hi_digits))
            };
            (token, lo, hi)
        }
    }
}

fn parse_saturating(digits: &str) -> usize {
    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(usize::MAX)
}

/// Inner text of a quoted-string token; the printer never emits escape
/// sequences, so the content is taken verbatim.
fn unquote(text: &str) -> &str {
    &text[1..text.len() - 1]
}

enum NumError {
    Range,
    Syntax,
}

/// Splits a number literal into sign, radix, and digits. The radix prefix
/// (`0x`, `0o`, `0b`) is case insensitive; no prefix means decimal.
fn split_radix(text: &str) -> (bool, u32, &str) {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = rest.get(..2).map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("0x") => (negative, 16, &rest[2..]),
        Some("0o") => (negative, 8, &rest[2..]),
        Some("0b") => (negative, 2, &rest[2..]),
        _ => (negative, 10, rest),
    }
}

fn parse_i64_prefixed(text: &str) -> Result<i64, NumError> {
    let (negative, radix, digits) = split_radix(text);
    let magnitude = u64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => NumError::Range,
        _ => NumError::Syntax,
    })?;
    if negative {
        if magnitude > (i64::MAX as u64) + 1 {
            return Err(NumError::Range);
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| NumError::Range)
    }
}

fn parse_i64_ranged(text: &str, byte_size: u8) -> Result<i64, NumError> {
    let value = parse_i64_prefixed(text)?;
    let (min, max) = match byte_size {
        1 => (i8::MIN as i64, i8::MAX as i64),
        2 => (i16::MIN as i64, i16::MAX as i64),
        4 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    };
    if value < min || value > max {
        return Err(NumError::Range);
    }
    Ok(value)
}

fn parse_u64_prefixed(text: &str) -> Result<u64, NumError> {
    let (negative, radix, digits) = split_radix(text);
    if negative {
        return Err(NumError::Syntax);
    }
    u64::from_str_radix(digits, radix).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow => NumError::Range,
        _ => NumError::Syntax,
    })
}

fn parse_u64_ranged(text: &str, byte_size: u8) -> Result<u64, NumError> {
    let value = parse_u64_prefixed(text)?;
    let max = match byte_size {
        1 => u8::MAX as u64,
        2 => u16::MAX as u64,
        4 => u32::MAX as u64,
        _ => u64::MAX,
    };
    if value > max {
        return Err(NumError::Range);
    }
    Ok(value)
}

/// Floats reject radix prefixes; a parse producing an infinity is a range
/// error. F4 literals are parsed at 32-bit precision and widened, so the
/// stored value matches what the wire codec produces for the same number.
fn parse_float(text: &str, byte_size: u8) -> Result<f64, NumError> {
    if byte_size == 4 {
        let value: f32 = text.parse().map_err(|_| NumError::Syntax)?;
        if !value.is_finite() {
            return Err(NumError::Range);
        }
        return Ok(value as f64);
    }
    let value: f64 = text.parse().map_err(|_| NumError::Syntax)?;
    if !value.is_finite() {
        return Err(NumError::Range);
    }
    Ok(value)
}

//! SML tokenizer.
//!
//! A single-pass scanner in the state-function style: each step runs one
//! state transition and pushes the tokens it recognized onto a queue. The
//! two primary states are the message header and the message text; `<`
//! switches header to text and `.` switches back.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Eof,
    Error,
    Comment,
    MessageEnd,
    StreamFunction,
    WaitBit,
    Direction,
    MessageName,
    LeftAngle,
    RightAngle,
    DataItemType,
    DataItemSize,
    Number,
    Bool,
    Variable,
    QuotedString,
    Ellipsis,
}

/// A tokenized text span. `line` and `col` locate the first character;
/// columns count Unicode scalars, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Text,
    Done,
}

pub(crate) struct Lexer<'a> {
    input: &'a str,
    state: State,
    pos: usize,
    start: usize,
    tokens: VecDeque<Token>,
}

const RESERVED_TYPES: [&str; 14] = [
    "L", "A", "B", "BOOLEAN", "F4", "F8", "I1", "I2", "I4", "I8", "U1", "U2", "U4", "U8",
];

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Lexer<'a> {
        Lexer {
            input,
            state: State::Header,
            pos: 0,
            start: 0,
            tokens: VecDeque::new(),
        }
    }

    /// Returns the next token. After an EOF or Error token the lexer is
    /// terminated and further calls return bare EOF tokens.
    pub fn next_token(&mut self) -> Token {
        loop {
            if let Some(token) = self.tokens.pop_front() {
                return token;
            }
            match self.state {
                State::Header => self.step_header(),
                State::Text => self.step_text(),
                State::Done => {
                    return Token {
                        kind: TokenKind::Eof,
                        text: String::new(),
                        line: 0,
                        col: 0,
                    }
                }
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn ignore(&mut self) {
        self.start = self.pos;
    }

    fn accept(&mut self, valid: &str) -> bool {
        if let Some(c) = self.peek_char() {
            if valid.contains(c) {
                self.pos += c.len_utf8();
                return true;
            }
        }
        false
    }

    fn accept_run(&mut self, valid: &str) {
        while self.accept(valid) {}
    }

    fn line_col(&self) -> (u32, u32) {
        let before = &self.input[..self.start];
        let line = 1 + before.matches('\n').count() as u32;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let col = 1 + self.input[line_start..self.start].chars().count() as u32;
        (line, col)
    }

    fn emit(&mut self, kind: TokenKind) {
        let text = self.input[self.start..self.pos].to_string();
        self.emit_text(kind, text);
    }

    fn emit_uppercase(&mut self, kind: TokenKind) {
        let text = self.input[self.start..self.pos].to_uppercase();
        self.emit_text(kind, text);
    }

    fn emit_space_removed(&mut self, kind: TokenKind) {
        let text = self.input[self.start..self.pos]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        self.emit_text(kind, text);
    }

    fn emit_text(&mut self, kind: TokenKind, text: String) {
        let (line, col) = self.line_col();
        self.tokens.push_back(Token {
            kind,
            text,
            line,
            col,
        });
        self.start = self.pos;
    }

    fn emit_eof(&mut self) {
        self.emit_text(TokenKind::Eof, "EOF".to_string());
        self.state = State::Done;
    }

    fn error(&mut self, text: String) {
        let (line, col) = self.line_col();
        self.tokens.push_back(Token {
            kind: TokenKind::Error,
            text,
            line,
            col,
        });
        self.state = State::Done;
    }

    /// Header state: stream-function, wait bit, direction, message name,
    /// `.`, or `<` switching to the text state.
    fn step_header(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                self.scan_comment();
                return;
            }
            if let Some(len) = match_stream_function(rest) {
                self.pos += len;
                self.emit_uppercase(TokenKind::StreamFunction);
                return;
            }
            if let Some(len) = match_wait_bit(rest) {
                self.pos += len;
                self.emit_uppercase(TokenKind::WaitBit);
                return;
            }
            if let Some(len) = match_direction(rest) {
                self.pos += len;
                self.emit_uppercase(TokenKind::Direction);
                return;
            }

            let c = match self.peek_char() {
                Some(c) => c,
                None => {
                    self.emit_eof();
                    return;
                }
            };
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.pos += 1;
                    self.ignore();
                }
                '.' => {
                    self.pos += 1;
                    self.emit(TokenKind::MessageEnd);
                    return;
                }
                '<' => {
                    self.pos += 1;
                    self.emit(TokenKind::LeftAngle);
                    self.state = State::Text;
                    return;
                }
                _ => {
                    self.scan_message_name();
                    return;
                }
            }
        }
    }

    /// Text state: data item types, sizes, numbers, booleans, variables,
    /// quoted strings, ellipsis, angle brackets, and `.` ending the message.
    fn step_text(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                self.scan_comment();
                return;
            }
            if let Some(len) = match_ellipsis(rest) {
                self.pos += len;
                self.emit(TokenKind::Ellipsis);
                return;
            }
            if let Some(len) = match_identifier(rest) {
                let upper = rest[..len].to_uppercase();
                self.pos += len;
                if RESERVED_TYPES.contains(&upper.as_str()) {
                    self.emit_uppercase(TokenKind::DataItemType);
                } else if upper == "T" || upper == "F" {
                    self.emit_uppercase(TokenKind::Bool);
                } else {
                    self.pos += match_array_tags(self.rest());
                    self.emit(TokenKind::Variable);
                }
                return;
            }

            let c = match self.peek_char() {
                Some(c) => c,
                None => {
                    self.emit_eof();
                    return;
                }
            };
            if c == '+'
                || c == '-'
                || c.is_ascii_digit()
                || (c == '.' && second_char_is_digit(rest))
            {
                self.scan_number();
                return;
            }
            match c {
                '<' => {
                    self.pos += 1;
                    self.emit(TokenKind::LeftAngle);
                    return;
                }
                '>' => {
                    self.pos += 1;
                    self.emit(TokenKind::RightAngle);
                    return;
                }
                '.' => {
                    self.pos += 1;
                    self.emit(TokenKind::MessageEnd);
                    self.state = State::Header;
                    return;
                }
                '[' => {
                    self.scan_data_item_size();
                    return;
                }
                '"' => {
                    self.scan_quoted_string();
                    return;
                }
                ' ' | '\t' | '\r' | '\n' => {
                    self.pos += 1;
                    self.ignore();
                }
                _ => {
                    self.error(format!(
                        "unexpected character in data item: U+{:04X} {:?}",
                        c as u32, c
                    ));
                    return;
                }
            }
        }
    }

    /// Message names run to the next whitespace, comment, or EOF.
    fn scan_message_name(&mut self) {
        loop {
            let rest = self.rest();
            let c = match rest.chars().next() {
                Some(c) => c,
                None => break,
            };
            if c.is_whitespace() {
                break;
            }
            if c == '/' && rest[1..].starts_with('/') {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.emit(TokenKind::MessageName);
    }

    /// Line comments run to the newline (trailing whitespace trimmed) or to
    /// EOF. The lexer stays in the state that saw the comment.
    fn scan_comment(&mut self) {
        match self.rest().find('\n') {
            None => {
                self.pos = self.input.len();
                self.emit(TokenKind::Comment);
            }
            Some(newline) => {
                let bytes = self.rest().as_bytes();
                let mut end = newline;
                while end > 0 && bytes[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                self.pos += end;
                self.emit(TokenKind::Comment);
            }
        }
    }

    /// Numbers: optional sign, optional radix prefix, digit runs, optional
    /// fraction and exponent. A trailing alphanumeric is a syntax error.
    fn scan_number(&mut self) {
        self.accept("+-");
        let mut digits = "0123456789";
        if self.accept("0") {
            if self.accept("xX") {
                digits = "0123456789abcdefABCDEF";
            } else if self.accept("bB") {
                digits = "01";
            } else if self.accept("oO") {
                digits = "01234567";
            }
        }
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        if self.accept("eE") {
            self.accept("+-");
            self.accept_run("0123456789");
        }
        if let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += c.len_utf8();
                let text = &self.input[self.start..self.pos];
                self.error(format!("invalid number syntax: {:?}", text));
                return;
            }
        }
        self.emit(TokenKind::Number);
    }

    /// Sizes: `[n]`, `[n..m]`, `[n..]`, `[..m]` with inner whitespace
    /// allowed (and stripped from the token text).
    fn scan_data_item_size(&mut self) {
        let mut number_found = false;
        self.accept("[");
        self.accept_run(" \t\r\n");
        if self.accept("0123456789") {
            number_found = true;
            self.accept_run("0123456789");
            self.accept_run(" \t\r\n");
        }
        if self.rest().starts_with("..") {
            self.pos += 2;
            self.accept_run(" \t\r\n");
            if self.accept("0123456789") {
                number_found = true;
                self.accept_run("0123456789");
                self.accept_run(" \t\r\n");
            }
        }
        if !(self.accept("]") && number_found) {
            self.error("invalid data item size".to_string());
            return;
        }
        self.emit_space_removed(TokenKind::DataItemSize);
    }

    /// Quoted strings must close before the end of the line.
    fn scan_quoted_string(&mut self) {
        self.accept("\"");
        let rest = self.rest();
        let close = rest.find('"');
        let newline = rest.find(['\r', '\n']);
        match (close, newline) {
            (Some(i), newline) if newline.map_or(true, |j| i < j) => {
                self.pos += i + 1;
                self.emit(TokenKind::QuotedString);
            }
            _ => self.error("unclosed quoted string".to_string()),
        }
    }
}

fn second_char_is_digit(s: &str) -> bool {
    s.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
}

/// `S<digits>F<digits>`, case insensitive.
fn match_stream_function(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    if b.is_empty() || !b[0].eq_ignore_ascii_case(&b'S') {
        return None;
    }
    let mut i = 1;
    let stream_digits = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == stream_digits || i >= b.len() || !b[i].eq_ignore_ascii_case(&b'F') {
        return None;
    }
    i += 1;
    let function_digits = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == function_digits {
        return None;
    }
    Some(i)
}

/// `W` or `[W]`, case insensitive.
fn match_wait_bit(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    if !b.is_empty() && b[0].eq_ignore_ascii_case(&b'W') {
        return Some(1);
    }
    if b.len() >= 3 && b[0] == b'[' && b[1].eq_ignore_ascii_case(&b'W') && b[2] == b']' {
        return Some(3);
    }
    None
}

/// `H->E`, `H<->E`, or `H<-E`, case insensitive.
fn match_direction(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    if b.is_empty() || !b[0].eq_ignore_ascii_case(&b'H') {
        return None;
    }
    for arrow in ["->", "<->", "<-"] {
        if s[1..].starts_with(arrow) {
            let end = 1 + arrow.len();
            if b.len() > end && b[end].eq_ignore_ascii_case(&b'E') {
                return Some(end + 1);
            }
        }
    }
    None
}

/// `...` with an optional `[digits]` tag.
fn match_ellipsis(s: &str) -> Option<usize> {
    if !s.starts_with("...") {
        return None;
    }
    Some(3 + match_array_tag(&s[3..]).unwrap_or(0))
}

/// `[A-Za-z_][A-Za-z0-9_]*`.
fn match_identifier(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    if b.is_empty() || !(b[0].is_ascii_alphabetic() || b[0] == b'_') {
        return None;
    }
    let mut i = 1;
    while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
        i += 1;
    }
    Some(i)
}

/// One `[digits]` group.
fn match_array_tag(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    if b.is_empty() || b[0] != b'[' {
        return None;
    }
    let mut i = 1;
    let digits = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits || i >= b.len() || b[i] != b']' {
        return None;
    }
    Some(i + 1)
}

/// As many `[digits]` groups as are present.
fn match_array_tags(s: &str) -> usize {
    let mut total = 0;
    while let Some(len) = match_array_tag(&s[total..]) {
        total += len;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            match token.kind {
                TokenKind::Eof => return tokens,
                TokenKind::Error => {
                    tokens.push(token);
                    return tokens;
                }
                _ => tokens.push(token),
            }
        }
    }

    fn lex_text(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        lexer.state = State::Text;
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            match token.kind {
                TokenKind::Eof => return tokens,
                TokenKind::Error => {
                    tokens.push(token);
                    return tokens;
                }
                _ => tokens.push(token),
            }
        }
    }

    fn tok(kind: TokenKind, text: &str, line: u32, col: u32) -> Token {
        Token {
            kind,
            text: text.to_string(),
            line,
            col,
        }
    }

    #[test]
    fn empty_input_is_eof_at_origin() {
        let mut lexer = Lexer::new("");
        let token = lexer.next_token();
        assert_eq!(token.kind, TokenKind::Eof);
        assert_eq!((token.line, token.col), (1, 1));
    }

    #[test]
    fn header_tokens_are_uppercased() {
        assert_eq!(
            lex_all("s42F9\tw H<->e message_name"),
            vec![
                tok(TokenKind::StreamFunction, "S42F9", 1, 1),
                tok(TokenKind::WaitBit, "W", 1, 7),
                tok(TokenKind::Direction, "H<->E", 1, 9),
                tok(TokenKind::MessageName, "message_name", 1, 15),
            ]
        );
        assert_eq!(
            lex_all("s42f128  [w] h<-e   "),
            vec![
                tok(TokenKind::StreamFunction, "S42F128", 1, 1),
                tok(TokenKind::WaitBit, "[W]", 1, 10),
                tok(TokenKind::Direction, "H<-E", 1, 14),
            ]
        );
    }

    #[test]
    fn header_without_spaces_still_splits() {
        assert_eq!(
            lex_all("S1F3wH->EMSGNAME//Comment"),
            vec![
                tok(TokenKind::StreamFunction, "S1F3", 1, 1),
                tok(TokenKind::WaitBit, "W", 1, 5),
                tok(TokenKind::Direction, "H->E", 1, 6),
                tok(TokenKind::MessageName, "MSGNAME", 1, 10),
                tok(TokenKind::Comment, "//Comment", 1, 17),
            ]
        );
    }

    #[test]
    fn unicode_message_name_and_columns() {
        assert_eq!(
            lex_all("\t \t메시지 \t\n S999F999 \t\r\n [w]\r\n"),
            vec![
                tok(TokenKind::MessageName, "메시지", 1, 4),
                tok(TokenKind::StreamFunction, "S999F999", 2, 2),
                tok(TokenKind::WaitBit, "[W]", 3, 2),
            ]
        );
    }

    #[test]
    fn data_item_types_and_bools() {
        assert_eq!(
            lex_text(" boolean"),
            vec![tok(TokenKind::DataItemType, "BOOLEAN", 1, 2)]
        );
        assert_eq!(
            lex_text("\r\n\r\n\tb"),
            vec![tok(TokenKind::DataItemType, "B", 3, 2)]
        );
        assert_eq!(
            lex_text("t f"),
            vec![
                tok(TokenKind::Bool, "T", 1, 1),
                tok(TokenKind::Bool, "F", 1, 3),
            ]
        );
    }

    #[test]
    fn variables_are_not_reserved_words() {
        for name in ["List", "binary", "booleanT", "ascii", "float", "true", "False"] {
            let tokens = lex_text(name);
            assert_eq!(tokens.len(), 1, "{}", name);
            assert_eq!(tokens[0].kind, TokenKind::Variable, "{}", name);
            assert_eq!(tokens[0].text, name);
        }
        assert_eq!(
            lex_text("__var42[1][2][42]"),
            vec![tok(TokenKind::Variable, "__var42[1][2][42]", 1, 1)]
        );
    }

    #[test]
    fn sizes_strip_inner_whitespace() {
        assert_eq!(
            lex_text("[  42\t\t]"),
            vec![tok(TokenKind::DataItemSize, "[42]", 1, 1)]
        );
        assert_eq!(
            lex_text("[\n0 ..\n42\n]"),
            vec![tok(TokenKind::DataItemSize, "[0..42]", 1, 1)]
        );
        assert_eq!(
            lex_text("[..42]"),
            vec![tok(TokenKind::DataItemSize, "[..42]", 1, 1)]
        );
        assert_eq!(
            lex_text("[0..]"),
            vec![tok(TokenKind::DataItemSize, "[0..]", 1, 1)]
        );
        let tokens = lex_text("[0 ... 42]");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Error);
    }

    #[test]
    fn numbers_cover_signs_radixes_and_floats() {
        for text in [
            "0", "142", "+42", "-42", "1.042", ".042", "-.042", "1E0", "1.496e+8", "6.626e-34",
            "0x042EFF", "0B100", "0o777",
        ] {
            let tokens = lex_text(text);
            assert_eq!(tokens, vec![tok(TokenKind::Number, text, 1, 1)], "{}", text);
        }
        let tokens = lex_text("42BF");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Error);
    }

    #[test]
    fn quoted_strings_must_close_on_the_same_line() {
        assert_eq!(
            lex_text(r#""with  spaces""#),
            vec![tok(TokenKind::QuotedString, r#""with  spaces""#, 1, 1)]
        );
        let tokens = lex_text("\"line feed\n\"");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Error);
    }

    #[test]
    fn ellipsis_with_optional_index() {
        assert_eq!(lex_text("..."), vec![tok(TokenKind::Ellipsis, "...", 1, 1)]);
        assert_eq!(
            lex_text("...[7]"),
            vec![tok(TokenKind::Ellipsis, "...[7]", 1, 1)]
        );
    }

    #[test]
    fn comments_return_to_the_surrounding_state() {
        assert_eq!(
            lex_all("// one\r\n   // two"),
            vec![
                tok(TokenKind::Comment, "// one", 1, 1),
                tok(TokenKind::Comment, "// two", 2, 4),
            ]
        );
        // A comment inside message text resumes the text state.
        assert_eq!(
            lex_text("<B 0// b1\n>"),
            vec![
                tok(TokenKind::LeftAngle, "<", 1, 1),
                tok(TokenKind::DataItemType, "B", 1, 2),
                tok(TokenKind::Number, "0", 1, 4),
                tok(TokenKind::Comment, "// b1", 1, 5),
                tok(TokenKind::RightAngle, ">", 2, 1),
            ]
        );
    }

    #[test]
    fn full_message_token_stream() {
        let input = "S99F99 [W] H<->E TestMessage\n<L [2]\n  <A[..10] ALTX>\n  <F4[0]>\n>\n.";
        let kinds: Vec<TokenKind> = lex_all(input).iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::StreamFunction,
                TokenKind::WaitBit,
                TokenKind::Direction,
                TokenKind::MessageName,
                TokenKind::LeftAngle,
                TokenKind::DataItemType,
                TokenKind::DataItemSize,
                TokenKind::LeftAngle,
                TokenKind::DataItemType,
                TokenKind::DataItemSize,
                TokenKind::Variable,
                TokenKind::RightAngle,
                TokenKind::LeftAngle,
                TokenKind::DataItemType,
                TokenKind::DataItemSize,
                TokenKind::RightAngle,
                TokenKind::RightAngle,
                TokenKind::MessageEnd,
            ]
        );
    }

    #[test]
    fn unexpected_character_terminates_with_error() {
        let tokens = lex_text("!@#");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
    }
}

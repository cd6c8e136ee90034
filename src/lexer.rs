use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::{
    ast::Token,
    error::{LexError, Position},
};

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Turns expression text into tokens, one at a time.
///
/// The lexer remembers whether the previous token closed an operand. That
/// single bit decides whether `-`/`+` are prefix or infix, whether `/` starts
/// a pattern literal or divides, and whether `[` escapes a parameter name or
/// opens an index.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    token_start: Position,
    after_operand: bool,
    finished: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            token_start: Position::new(0, 1, 1),
            after_operand: false,
            finished: false,
        }
    }

    /// Where the most recently returned token starts.
    pub fn token_start(&self) -> Position {
        self.token_start
    }

    fn here(&self) -> Position {
        Position::new(self.position, self.line, self.column)
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn advance_by(&mut self, count: usize) {
        for _ in 0..count {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn next_non_whitespace(&self) -> Option<char> {
        self.input[self.position..]
            .iter()
            .copied()
            .find(|c| !c.is_whitespace())
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else if ch == '.' && self.peek_char(1).is_some_and(|c| c.is_alphabetic() || c == '_') {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// `[name with-any chars]`, used where an operand is expected.
    fn read_escaped_identifier(&mut self) -> Result<String, LexError> {
        let start = self.here();
        self.advance(); // Consume '['

        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == ']' {
                return Ok(result);
            }
            result.push(ch);
        }
        Err(LexError::UnterminatedName { position: start })
    }

    fn read_string(&mut self, quote: char) -> Result<String, LexError> {
        let start = self.here();
        let mut result = String::new();
        self.advance(); // Consume opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let escape_at = self.here();
                    self.advance(); // Consume backslash
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some('r') => result.push('\r'),
                        Some('0') => result.push('\0'),
                        Some(c @ ('"' | '\'' | '\\' | '/')) => result.push(c),
                        Some(c) => {
                            return Err(LexError::InvalidEscape {
                                ch: c,
                                position: escape_at,
                            });
                        }
                        None => return Err(LexError::UnterminatedString { position: start }),
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError::UnterminatedString { position: start })
    }

    /// Pattern body between `delimiter`s. Only `\<delimiter>` is unescaped;
    /// every other backslash is kept for the regex engine.
    fn read_pattern(&mut self, delimiter: char) -> Result<Regex, LexError> {
        let start = self.here();
        let mut source = String::new();
        self.advance(); // Consume opening delimiter

        loop {
            match self.current_char() {
                None => return Err(LexError::UnterminatedPattern { position: start }),
                Some(c) if c == delimiter => {
                    self.advance();
                    break;
                }
                Some('\\') if self.peek_char(1) == Some(delimiter) => {
                    source.push(delimiter);
                    self.advance_by(2);
                }
                Some(c) => {
                    source.push(c);
                    self.advance();
                }
            }
        }

        Regex::new(&source).map_err(|e| LexError::InvalidPattern {
            pattern: source.clone(),
            message: e.to_string(),
            position: start,
        })
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.here();
        let mut number = String::new();

        if self.current_char() == Some('0') && matches!(self.peek_char(1), Some('x' | 'X')) {
            self.advance_by(2);
            while let Some(ch) = self.current_char().filter(|c| c.is_ascii_hexdigit()) {
                number.push(ch);
                self.advance();
            }
            self.reject_trailing(&mut number, start, "0x")?;
            return u64::from_str_radix(&number, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| LexError::MalformedNumber {
                    text: format!("0x{}", number),
                    position: start,
                });
        }

        self.read_digits(&mut number);

        if self.current_char() == Some('.') {
            number.push('.');
            self.advance();
            if !self.read_digits(&mut number) {
                return Err(self.malformed(number, start));
            }
        }

        if matches!(self.current_char(), Some('e' | 'E')) {
            number.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.current_char() {
                number.push(sign);
                self.advance();
            }
            if !self.read_digits(&mut number) {
                return Err(self.malformed(number, start));
            }
        }

        self.reject_trailing(&mut number, start, "")?;

        number
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LexError::MalformedNumber {
                text: number,
                position: start,
            })
    }

    fn read_digits(&mut self, into: &mut String) -> bool {
        let before = into.len();
        while let Some(ch) = self.current_char().filter(char::is_ascii_digit) {
            into.push(ch);
            self.advance();
        }
        into.len() > before
    }

    /// Digits glued to letters (`12abc`, `1.5.2`, `0x`) are one malformed literal.
    fn reject_trailing(
        &mut self,
        number: &mut String,
        start: Position,
        prefix: &str,
    ) -> Result<(), LexError> {
        let glued = self
            .current_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
        if glued || number.is_empty() {
            while let Some(ch) = self
                .current_char()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            {
                number.push(ch);
                self.advance();
            }
            return Err(LexError::MalformedNumber {
                text: format!("{}{}", prefix, number),
                position: start,
            });
        }
        Ok(())
    }

    fn malformed(&mut self, mut number: String, start: Position) -> LexError {
        while let Some(ch) = self
            .current_char()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
        {
            number.push(ch);
            self.advance();
        }
        LexError::MalformedNumber {
            text: number,
            position: start,
        }
    }

    /// Produces the next token, or [`Token::Eof`] once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        self.token_start = self.here();

        let token = self.scan()?;
        self.after_operand = token.ends_operand();
        Ok(token)
    }

    fn single(&mut self, token: Token) -> Result<Token, LexError> {
        self.advance();
        Ok(token)
    }

    fn double(&mut self, token: Token) -> Result<Token, LexError> {
        self.advance_by(2);
        Ok(token)
    }

    fn scan(&mut self) -> Result<Token, LexError> {
        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };
        let next = self.peek_char(1);

        match ch {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            ']' => self.single(Token::RBracket),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '%' => self.single(Token::Percent),
            '^' => self.single(Token::Caret),
            '~' => self.single(Token::BitNot),
            '[' if self.after_operand => self.single(Token::LBracket),
            '[' => self.read_escaped_identifier().map(Token::Identifier),
            '-' if self.after_operand => self.single(Token::Minus),
            '-' => self.single(Token::Negate),
            '+' if self.after_operand => self.single(Token::Plus),
            '+' => self.single(Token::UnaryPlus),
            '/' if self.after_operand => self.single(Token::Slash),
            '/' => self.read_pattern('/').map(Token::Pattern),
            '`' => self.read_pattern('`').map(Token::Pattern),
            '*' if next == Some('*') => self.double(Token::StarStar),
            '*' => self.single(Token::Star),
            '=' if next == Some('=') => self.double(Token::EqEq),
            '=' if next == Some('~') => self.double(Token::Match),
            '!' if next == Some('=') => self.double(Token::NotEq),
            '!' if next == Some('~') => self.double(Token::NotMatch),
            '!' => self.single(Token::Not),
            '<' if next == Some('<') => self.double(Token::ShiftLeft),
            '<' if next == Some('=') => self.double(Token::LtEq),
            '<' => self.single(Token::Lt),
            '>' if next == Some('>') => self.double(Token::ShiftRight),
            '>' if next == Some('=') => self.double(Token::GtEq),
            '>' => self.single(Token::Gt),
            '&' if next == Some('&') => self.double(Token::AndAnd),
            '&' => self.single(Token::Amp),
            '|' if next == Some('|') => self.double(Token::OrOr),
            '|' => self.single(Token::Pipe),
            '?' if next == Some('?') => self.double(Token::QuestionQuestion),
            '?' => self.single(Token::Question),
            '"' | '\'' => {
                let text = self.read_string(ch)?;
                Ok(match parse_time(&text) {
                    Some(time) => Token::Time(time),
                    None => Token::String(text),
                })
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();

                Ok(match ident.as_str() {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "nil" | "null" => Token::Nil,
                    "in" | "IN" => Token::In,
                    _ if self.next_non_whitespace() == Some('(') => Token::Function(ident),
                    _ => Token::Identifier(ident),
                })
            }
            c => Err(LexError::UnexpectedCharacter {
                ch: c,
                position: self.here(),
            }),
        }
    }
}

/// Lazily yields tokens up to (not including) [`Token::Eof`]; stops after the first error.
impl Iterator for Lexer {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(Token::Eof) => {
                self.finished = true;
                None
            }
            Ok(token) => Some(Ok(token)),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads a quoted string as a UTC instant if it is a whole date or date-time.
fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(time) = NaiveDateTime::parse_from_str(text, format) {
            return Some(time.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("true false nil null in IN");
    assert_eq!(lexer.next_token().unwrap(), Token::Boolean(true));
    assert_eq!(lexer.next_token().unwrap(), Token::Boolean(false));
    assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    assert_eq!(lexer.next_token().unwrap(), Token::In);
    assert_eq!(lexer.next_token().unwrap(), Token::In);
    assert_eq!(lexer.next_token().unwrap(), Token::Eof);
}

#[test]
fn test_threshold_comparison() {
    let mut lexer = Lexer::new("(foo - 1) > -threshold");
    assert_eq!(lexer.next_token().unwrap(), Token::LParen);
    assert_eq!(lexer.next_token().unwrap(), Token::Identifier("foo".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Minus);
    assert_eq!(lexer.next_token().unwrap(), Token::Number(1.0));
    assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    assert_eq!(lexer.next_token().unwrap(), Token::Gt);
    assert_eq!(lexer.next_token().unwrap(), Token::Negate);
    assert_eq!(lexer.next_token().unwrap(), Token::Identifier("threshold".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Eof);
}

#[test]
fn test_time_literal_formats() {
    let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(12, 30, 0))
        .map(|t| t.and_utc())
        .unwrap();
    for text in ["2024-03-01 12:30:00", "2024-03-01T12:30:00", "2024-03-01 12:30", "2024-03-01T12:30:00Z"] {
        assert_eq!(parse_time(text), Some(expected), "Failed for input: {}", text);
    }
    assert_eq!(parse_time("tomorrow"), None);
    assert_eq!(parse_time("2024"), None);
}

use std::{fmt, mem};

use chrono::{DateTime, Utc};
use regex::Regex;

/// Lexical token produced by the [`Lexer`](crate::lexer::Lexer).
///
/// Tokens whose spelling is shared between a prefix and an infix operator
/// (`-`, `+`) come out of the lexer already disambiguated, so the parser never
/// has to guess.
#[derive(Debug, Clone)]
pub enum Token {
    // Literals
    /// Numeric literal, decimal or hexadecimal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// 1e-3
    /// 0xFF
    /// ```
    Number(f64),

    /// String literal in single or double quotes
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// 'item #1'
    /// ```
    String(String),

    /// `true` or `false`
    Boolean(bool),

    /// `nil` (or `null`)
    Nil,

    /// Quoted string that reads as a date or date-time
    ///
    /// # Examples
    /// ```text
    /// '2024-03-01'
    /// '2024-03-01 12:30:00'
    /// "2024-03-01T12:30:00Z"
    /// ```
    Time(DateTime<Utc>),

    /// Regular expression literal, compiled while lexing
    ///
    /// # Examples
    /// ```text
    /// `^[a-z]+$`
    /// /^v\d+/
    /// ```
    Pattern(Regex),

    // Names
    /// Parameter name, possibly dotted or bracket-escaped
    ///
    /// # Examples
    /// ```text
    /// foo
    /// request.method
    /// [response-time]
    /// ```
    Identifier(String),

    /// Identifier immediately followed by `(`
    Function(String),

    // Prefix operators
    /// Unary minus
    Negate,
    /// Unary plus
    UnaryPlus,
    /// Logical not (`!`)
    Not,
    /// Bitwise not (`~`)
    BitNot,

    // Arithmetic
    /// Addition or concatenation (`+`)
    Plus,
    /// Subtraction (`-`)
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// Exponent (`**`)
    StarStar,

    // Comparison
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// Regex match (`=~`)
    Match,
    /// Regex non-match (`!~`)
    NotMatch,

    // Logical
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,

    // Bitwise
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,

    // Ternary and null-coalescing
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `??`
    QuestionQuestion,

    /// Membership (`in` / `IN`)
    In,

    // Delimiters
    /// Separator for arguments and array elements
    Comma,
    LParen,
    RParen,
    /// Opens an index after an operand
    LBracket,
    RBracket,

    /// End of input
    Eof,
}

impl Token {
    /// True when this token can close an operand, which makes a following
    /// `-`, `+`, `/` or `[` an infix or postfix form.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::String(_)
                | Token::Boolean(_)
                | Token::Nil
                | Token::Time(_)
                | Token::Pattern(_)
                | Token::Identifier(_)
                | Token::RParen
                | Token::RBracket
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Number(_) => "number",
            Token::String(_) => "string",
            Token::Boolean(_) => "boolean",
            Token::Nil => "nil",
            Token::Time(_) => "time",
            Token::Pattern(_) => "pattern",
            Token::Identifier(_) => "identifier",
            Token::Function(_) => "function",
            Token::Negate | Token::Minus => "-",
            Token::UnaryPlus | Token::Plus => "+",
            Token::Not => "!",
            Token::BitNot => "~",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Match => "=~",
            Token::NotMatch => "!~",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::ShiftLeft => "<<",
            Token::ShiftRight => ">>",
            Token::Question => "?",
            Token::Colon => ":",
            Token::QuestionQuestion => "??",
            Token::In => "in",
            Token::Comma => ",",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Eof => "end of expression",
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Number(a), Token::Number(b)) => a == b,
            (Token::String(a), Token::String(b)) => a == b,
            (Token::Boolean(a), Token::Boolean(b)) => a == b,
            (Token::Time(a), Token::Time(b)) => a == b,
            (Token::Pattern(a), Token::Pattern(b)) => a.as_str() == b.as_str(),
            (Token::Identifier(a), Token::Identifier(b)) => a == b,
            (Token::Function(a), Token::Function(b)) => a == b,
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::String(s) => write!(f, "string \"{}\"", s),
            Token::Boolean(b) => write!(f, "'{}'", b),
            Token::Time(t) => write!(f, "time {}", t.to_rfc3339()),
            Token::Pattern(re) => write!(f, "pattern `{}`", re.as_str()),
            Token::Identifier(name) => write!(f, "identifier '{}'", name),
            Token::Function(name) => write!(f, "function '{}'", name),
            Token::Eof => write!(f, "end of expression"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

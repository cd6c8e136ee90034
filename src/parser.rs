use std::mem;

use regex::Regex;

use crate::{
    ast::{BinOp, Stage, Token, UnaryOp},
    error::{CompileError, ParseError, Position},
    functions::FunctionRegistry,
    lexer::Lexer,
    value::Value,
};

/// Depth budget. Entering a nested sub-expression costs [`NESTING_COST`],
/// each extra link in a left-associative chain (`a + b + c`, `x[0][1]`)
/// costs one. Together they bound both parser recursion and the depth of the
/// resulting tree.
///
/// The evaluator folds chains in a loop and only recurses into nested
/// sub-expressions, of which at most `MAX_DEPTH / NESTING_COST` (64) can be
/// open at once. That keeps parsing and evaluating well inside a default
/// 2 MiB thread stack.
const MAX_DEPTH: usize = 1024;
const NESTING_COST: usize = 16;

/// Binding power of the left-associative infix operators, lowest first.
/// `**`, `?:` and `??` are handled by their own rules.
fn infix(token: &Token) -> Option<(BinOp, u8)> {
    let entry = match token {
        Token::OrOr => (BinOp::Or, 1),
        Token::AndAnd => (BinOp::And, 2),
        Token::Pipe => (BinOp::BitOr, 3),
        Token::Caret => (BinOp::BitXor, 4),
        Token::Amp => (BinOp::BitAnd, 5),
        Token::EqEq => (BinOp::Equal, 6),
        Token::NotEq => (BinOp::NotEqual, 6),
        Token::Match => (BinOp::Match, 6),
        Token::NotMatch => (BinOp::NotMatch, 6),
        Token::Lt => (BinOp::LessThan, 7),
        Token::LtEq => (BinOp::LessEqual, 7),
        Token::Gt => (BinOp::GreaterThan, 7),
        Token::GtEq => (BinOp::GreaterEqual, 7),
        Token::In => (BinOp::In, 7),
        Token::ShiftLeft => (BinOp::ShiftLeft, 8),
        Token::ShiftRight => (BinOp::ShiftRight, 8),
        Token::Plus => (BinOp::Add, 9),
        Token::Minus => (BinOp::Subtract, 9),
        Token::Star => (BinOp::Multiply, 10),
        Token::Slash => (BinOp::Divide, 10),
        Token::Percent => (BinOp::Modulo, 10),
        _ => return None,
    };
    Some(entry)
}

/// Builds a stage tree from the lexer's tokens.
///
/// # Examples
///
/// ```
/// use valuate::{BinOp, Lexer, Parser, Stage};
///
/// let mut parser = Parser::new(Lexer::new("2 + 3 * 4")).unwrap();
/// let stage = parser.parse().unwrap();
///
/// assert!(matches!(stage, Stage::Binary { op: BinOp::Add, .. }));
/// ```
pub struct Parser<'r> {
    lexer: Lexer,
    current_token: Token,
    current_position: Position,
    functions: &'r FunctionRegistry,
    depth: usize,
}

impl Parser<'static> {
    /// Parser resolving calls against the standard function registry.
    pub fn new(lexer: Lexer) -> Result<Self, CompileError> {
        Parser::with_functions(lexer, FunctionRegistry::shared_standard())
    }
}

impl<'r> Parser<'r> {
    pub fn with_functions(
        mut lexer: Lexer,
        functions: &'r FunctionRegistry,
    ) -> Result<Self, CompileError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            current_position: lexer.token_start(),
            lexer,
            current_token,
            functions,
            depth: 0,
        })
    }

    fn advance(&mut self) -> Result<(), CompileError> {
        self.current_token = self.lexer.next_token()?;
        self.current_position = self.lexer.token_start();
        Ok(())
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current_token) == mem::discriminant(token)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let error = match self.current_token {
            Token::Eof => ParseError::UnexpectedEnd {
                expected: expected.to_string(),
                position: self.current_position,
            },
            ref token => ParseError::UnexpectedToken {
                found: token.to_string(),
                expected: expected.to_string(),
                position: self.current_position,
            },
        };
        error.into()
    }

    /// Consumes the token closing a group opened at `opened`.
    fn expect_closing(&mut self, closing: Token, opened: Position) -> Result<(), CompileError> {
        if self.check(&closing) {
            return self.advance();
        }
        if self.check(&Token::Eof) {
            let delimiter = match closing {
                Token::RBracket => '[',
                _ => '(',
            };
            return Err(ParseError::UnclosedDelimiter {
                delimiter,
                position: opened,
            }
            .into());
        }
        Err(self.unexpected(&format!("'{}'", closing.symbol())))
    }

    fn descend<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.depth += NESTING_COST;
        let result = if self.depth > MAX_DEPTH {
            Err(ParseError::NestingTooDeep {
                position: self.current_position,
            }
            .into())
        } else {
            parse(self)
        };
        self.depth -= NESTING_COST;
        result
    }

    fn lengthen_chain(&mut self, chained: &mut usize) -> Result<(), CompileError> {
        self.depth += 1;
        *chained += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::NestingTooDeep {
                position: self.current_position,
            }
            .into());
        }
        Ok(())
    }

    /// Parses a complete expression; anything left over is an error.
    pub fn parse(&mut self) -> Result<Stage, CompileError> {
        let stage = self.parse_expression()?;
        if !self.check(&Token::Eof) {
            return Err(self.unexpected("end of expression"));
        }
        Ok(stage)
    }

    pub fn parse_expression(&mut self) -> Result<Stage, CompileError> {
        self.descend(Self::parse_coalesce)
    }

    fn parse_coalesce(&mut self) -> Result<Stage, CompileError> {
        let mut left = self.parse_ternary()?;
        let mut chained = 0;

        while self.check(&Token::QuestionQuestion) {
            self.lengthen_chain(&mut chained)?;
            self.advance()?;
            let right = self.parse_ternary()?;
            left = Stage::binary(BinOp::NullCoalesce, left, right);
        }

        self.depth -= chained;
        Ok(left)
    }

    fn parse_ternary(&mut self) -> Result<Stage, CompileError> {
        let condition = self.parse_binary(1)?;

        if !self.check(&Token::Question) {
            return Ok(condition);
        }
        self.advance()?;

        let then = self.parse_expression()?;
        if !self.check(&Token::Colon) {
            return Err(self.unexpected("':'"));
        }
        self.advance()?;

        // Right-associative: `a ? b : c ? d : e` nests in the else branch.
        let otherwise = self.descend(Self::parse_ternary)?;

        Ok(Stage::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    /// Precedence climbing over the table in [`infix`].
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Stage, CompileError> {
        let mut left = self.parse_exponent()?;
        let mut chained = 0;

        loop {
            let Some((op, precedence)) = infix(&self.current_token) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }

            self.lengthen_chain(&mut chained)?;
            self.advance()?;

            let right_position = self.current_position;
            let right = self.descend(|parser| parser.parse_binary(precedence + 1))?;
            let right = match op {
                BinOp::Match | BinOp::NotMatch => precompile_pattern(right, right_position)?,
                _ => right,
            };

            left = Stage::binary(op, left, right);
        }

        self.depth -= chained;
        Ok(left)
    }

    fn parse_exponent(&mut self) -> Result<Stage, CompileError> {
        let base = self.parse_unary()?;

        if !self.check(&Token::StarStar) {
            return Ok(base);
        }
        self.advance()?;

        let exponent = self.descend(Self::parse_exponent)?;
        Ok(Stage::binary(BinOp::Power, base, exponent))
    }

    fn parse_unary(&mut self) -> Result<Stage, CompileError> {
        let op = match self.current_token {
            Token::Negate => UnaryOp::Negate,
            Token::UnaryPlus => UnaryOp::Plus,
            Token::Not => UnaryOp::Not,
            Token::BitNot => UnaryOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.advance()?;

        let operand = self.descend(Self::parse_unary)?;

        Ok(match (op, operand) {
            (UnaryOp::Negate, Stage::Literal(Value::Number(n))) => Stage::Literal(Value::Number(-n)),
            (op, operand) => Stage::unary(op, operand),
        })
    }

    /// Index accesses following an operand: `items[0][1]`
    fn parse_postfix(&mut self) -> Result<Stage, CompileError> {
        let mut stage = self.parse_primary()?;
        let mut chained = 0;

        while self.check(&Token::LBracket) {
            self.lengthen_chain(&mut chained)?;
            let opened = self.current_position;
            self.advance()?; // Consume '['

            let index = self.parse_expression()?;
            self.expect_closing(Token::RBracket, opened)?;

            stage = Stage::Index {
                target: Box::new(stage),
                index: Box::new(index),
            };
        }

        self.depth -= chained;
        Ok(stage)
    }

    /// Parse primary expressions: literals, parameters, calls, groups and lists
    fn parse_primary(&mut self) -> Result<Stage, CompileError> {
        let position = self.current_position;

        let literal = match &self.current_token {
            Token::Number(n) => Some(Value::Number(*n)),
            Token::Boolean(b) => Some(Value::Boolean(*b)),
            Token::Nil => Some(Value::Nil),
            Token::Time(t) => Some(Value::Time(*t)),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance()?;
            return Ok(Stage::Literal(value));
        }

        match mem::replace(&mut self.current_token, Token::Eof) {
            Token::String(s) => {
                self.advance()?;
                Ok(Stage::Literal(Value::String(s)))
            }
            Token::Pattern(re) => {
                self.advance()?;
                Ok(Stage::Literal(Value::Pattern(re)))
            }
            Token::Identifier(name) => {
                self.advance()?;
                Ok(Stage::Parameter(name))
            }
            Token::Function(name) => {
                self.advance()?;
                self.parse_call(name, position)
            }
            Token::LParen => {
                self.advance()?;
                let mut items = self.parse_list(Token::RParen, position)?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Stage::Array(items))
                }
            }
            token => {
                self.current_token = token;
                Err(self.unexpected("operand"))
            }
        }
    }

    /// Comma-separated expressions up to `closing`. At least one element.
    fn parse_list(&mut self, closing: Token, opened: Position) -> Result<Vec<Stage>, CompileError> {
        let mut items = vec![self.parse_expression()?];

        while self.check(&Token::Comma) {
            self.advance()?;
            items.push(self.parse_expression()?);
        }

        self.expect_closing(closing, opened)?;
        Ok(items)
    }

    fn parse_call(&mut self, name: String, position: Position) -> Result<Stage, CompileError> {
        let function = self
            .functions
            .get(&name)
            .cloned()
            .ok_or_else(|| ParseError::UnknownFunction {
                name: name.clone(),
                position,
            })?;

        if !self.check(&Token::LParen) {
            return Err(self.unexpected("'('"));
        }
        let opened = self.current_position;
        self.advance()?;

        let args = if self.check(&Token::RParen) {
            self.advance()?;
            Vec::new()
        } else {
            self.parse_list(Token::RParen, opened)?
        };

        if !function.arity().accepts(args.len()) {
            return Err(ParseError::ArityMismatch {
                name,
                expected: function.arity().to_string(),
                found: args.len(),
                position,
            }
            .into());
        }

        Ok(Stage::Call { function, args })
    }
}

/// A string literal on the right of `=~` / `!~` is compiled once, here.
fn precompile_pattern(stage: Stage, position: Position) -> Result<Stage, CompileError> {
    match stage {
        Stage::Literal(Value::String(source)) => match Regex::new(&source) {
            Ok(re) => Ok(Stage::Literal(Value::Pattern(re))),
            Err(e) => Err(ParseError::InvalidPattern {
                message: e.to_string(),
                pattern: source,
                position,
            }
            .into()),
        },
        other => Ok(other),
    }
}

pub mod ast;
pub mod batch;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod functions;
#[cfg(feature = "json")]
pub mod json;
pub mod lexer;
pub mod parameters;
pub mod parser;
pub mod value;

pub use ast::{BinOp, Stage, Token, UnaryOp};
pub use batch::BatchResult;
pub use error::{CompileError, EvalError, FunctionError, LexError, ParseError, Position};
pub use evaluator::Evaluator;
pub use expression::Expression;
pub use functions::{Arity, Function, FunctionRegistry};
#[cfg(feature = "json")]
pub use json::JsonError;
pub use lexer::Lexer;
pub use parameters::{FnParameters, MapParameters, Parameters};
pub use parser::Parser;
pub use value::Value;

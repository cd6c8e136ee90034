//! # Expression syntax tree
//!
//! This module defines the lexical tokens and the compiled stage tree of the
//! expression language.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[operators]** - Binary and prefix operators
//! - **[stage]** - Nodes of the compiled stage tree
//!
//! ## Quick Start
//!
//! ```text
//! (requests_made * requests_succeeded / 100) >= 90
//! ```
//!
//! This expression compiles to a `>=` stage whose left child is the
//! parenthesised arithmetic and whose right child is the literal `90`.
//!
//! ## Operator Precedence
//!
//! Highest to lowest:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | prefix | `-` `+` `!` `~` |
//! | exponent | `**` (right-associative) |
//! | multiplicative | `*` `/` `%` |
//! | additive | `+` `-` |
//! | shift | `<<` `>>` |
//! | relational | `<` `<=` `>` `>=` `in` |
//! | equality | `==` `!=` `=~` `!~` |
//! | bitwise and | `&` |
//! | bitwise xor | `^` |
//! | bitwise or | `\|` |
//! | logical and | `&&` |
//! | logical or | `\|\|` |
//! | ternary | `? :` (right-associative) |
//! | null-coalescing | `??` |
//!
//! ## Examples
//!
//! ### Access control
//!
//! ```text
//! user_role == 'admin' || resource_owner == user_id
//! ```
//!
//! ### Defaults for missing parameters
//!
//! ```text
//! (timeout ?? 30) * 1000
//! ```
//!
//! ### Pattern matching
//!
//! ```text
//! path =~ `^/api/v[0-9]+/`
//! ```
pub mod operators;
pub mod stage;
pub mod tokens;

pub use operators::{BinOp, UnaryOp};
pub use stage::Stage;
pub use tokens::Token;

//! Urn expression language
//!
//! A restricted XPath dialect: location steps addressing hierarchy levels, with
//! bracketed predicates over the level's attributes.
//!
//! - [`scanner`] - tokenizer
//! - [`ast`] - parsed tree and static return types
//! - [`parser`] - recursive-descent parser

pub mod ast;
pub mod parser;
pub mod scanner;

pub use ast::{AstNode, AxisKind, FunctionKind, Literal, NodeTest, OperatorKind, ReturnType};
pub use parser::parse;
pub use scanner::{Scanner, Token};

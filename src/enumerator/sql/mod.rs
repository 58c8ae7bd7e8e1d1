//! SQL-backed levels
//!
//! A [`SqlLevel`] reads its table, columns and parent join from a level
//! definition file ([`LevelDefinition`]). Levels above the requested one run
//! with a reserved result type and return a [`SqlEnumResult`] instead of rows;
//! the requested level merges those into one statement and executes it.

pub mod definition;
mod level;
pub mod statement;

pub use definition::LevelDefinition;
pub use level::SqlLevel;
pub use statement::{SqlEnumResult, StatementBuilder};

/// `implement` name the metadata uses for [`SqlLevel`]
pub const SQL_LEVEL_IMPLEMENTATION: &str = "SqlObject";

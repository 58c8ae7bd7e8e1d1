//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout urnquery.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `Syntax`: Malformed urn/filter expression (lexer or parser), with an [`XPathErrorCode`]
//! - `InvalidQueryExpression`: Expression that parses but cannot be lowered to a filter or SQL
//! - `UnresolvedUrn`, `UnknownProperty`, `InvalidPropertyUsage`: Resolution against metadata
//! - `QueryNotSupported`, `ResultNotSupported`: Request shapes a level cannot serve
//! - `ObjectNotFound`, `ConnectionLost`, `ExecutionFailed`: Statement execution
//! - `ConfigError`, `Internal`: Metadata/configuration problems and broken invariants

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed set of syntax error codes raised by the scanner and parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XPathErrorCode {
    UnclosedString,
    TokenExpected,
    InvalidToken,
    QueryExpected,
    NodeSetExpected,
    NodeTestExpected,
    ExpressionExpected,
    NumberExpected,
    FunctionExpected,
    InvalidNumArgs,
    InvalidArgument,
    InvalidName,
}

impl XPathErrorCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnclosedString => "UnclosedString",
            Self::TokenExpected => "TokenExpected",
            Self::InvalidToken => "InvalidToken",
            Self::QueryExpected => "QueryExpected",
            Self::NodeSetExpected => "NodeSetExpected",
            Self::NodeTestExpected => "NodeTestExpected",
            Self::ExpressionExpected => "ExpressionExpected",
            Self::NumberExpected => "NumberExpected",
            Self::FunctionExpected => "FunctionExpected",
            Self::InvalidNumArgs => "InvalidNumArgs",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidName => "InvalidName",
        }
    }
}

impl fmt::Display for XPathErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for urnquery operations
#[derive(Error, Debug)]
pub enum EnumError {
    /// Lexical or grammar violation; `token` is the query text starting at the offending token
    #[error("Syntax error ({code}) at '{token}'")]
    Syntax { code: XPathErrorCode, token: String },

    /// Expression shape that the filter/SQL pipeline cannot express
    #[error("Invalid query expression: {0}")]
    InvalidQueryExpression(String),

    /// A urn segment has no counterpart in the level hierarchy
    #[error("Urn could not be resolved at level {0}")]
    UnresolvedUrn(String),

    /// Property not declared by the level
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// Property exists but not for the requested usage
    #[error("Property {property} cannot be used for {usage}")]
    InvalidPropertyUsage { property: String, usage: String },

    /// Request cannot be served
    #[error("Query not supported: {0}")]
    QueryNotSupported(String),

    /// Requested result shape cannot be produced by the level
    #[error("Result type not supported: {0}")]
    ResultNotSupported(String),

    /// The engine reported a missing/offline target object
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The connection dropped while executing
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Any other statement execution failure
    #[error("Execution failed ({engine}): {detail}")]
    ExecutionFailed { engine: String, detail: String },

    /// Invalid input to a public entry point
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration or metadata resource error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EnumError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "XPATH_SYNTAX",
            Self::InvalidQueryExpression(_) => "INVALID_QUERY_EXPRESSION",
            Self::UnresolvedUrn(_) => "UNRESOLVED_URN",
            Self::UnknownProperty(_) => "UNKNOWN_PROPERTY",
            Self::InvalidPropertyUsage { .. } => "INVALID_PROPERTY_USAGE",
            Self::QueryNotSupported(_) => "QUERY_NOT_SUPPORTED",
            Self::ResultNotSupported(_) => "RESULT_NOT_SUPPORTED",
            Self::ObjectNotFound(_) => "OBJECT_NOT_FOUND",
            Self::ConnectionLost(_) => "CONNECTION_LOST",
            Self::ExecutionFailed { .. } => "EXECUTION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Syntax error code, if this is a syntax error
    #[must_use]
    pub const fn syntax_code(&self) -> Option<XPathErrorCode> {
        match self {
            Self::Syntax { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Create a syntax error carrying the offending query text
    pub fn syntax(code: XPathErrorCode, token: impl Into<String>) -> Self {
        Self::Syntax {
            code,
            token: token.into(),
        }
    }

    pub fn invalid_query_expression(message: impl Into<String>) -> Self {
        Self::InvalidQueryExpression(message.into())
    }

    pub fn unresolved_urn(level: impl Into<String>) -> Self {
        Self::UnresolvedUrn(level.into())
    }

    pub fn unknown_property(name: impl Into<String>) -> Self {
        Self::UnknownProperty(name.into())
    }

    pub fn invalid_property_usage(property: impl Into<String>, usage: impl Into<String>) -> Self {
        Self::InvalidPropertyUsage {
            property: property.into(),
            usage: usage.into(),
        }
    }

    pub fn query_not_supported(message: impl Into<String>) -> Self {
        Self::QueryNotSupported(message.into())
    }

    pub fn result_not_supported(message: impl Into<String>) -> Self {
        Self::ResultNotSupported(message.into())
    }

    pub fn object_not_found(message: impl Into<String>) -> Self {
        Self::ObjectNotFound(message.into())
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost(message.into())
    }

    /// Create an engine-specific execution error
    pub fn execution_failed(engine: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            engine: engine.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Result type alias for urnquery operations
pub type Result<T> = std::result::Result<T, EnumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EnumError::syntax(XPathErrorCode::UnclosedString, "'abc").error_code(),
            "XPATH_SYNTAX"
        );
        assert_eq!(
            EnumError::invalid_query_expression("x").error_code(),
            "INVALID_QUERY_EXPRESSION"
        );
        assert_eq!(
            EnumError::unresolved_urn("Foo").error_code(),
            "UNRESOLVED_URN"
        );
        assert_eq!(
            EnumError::unknown_property("x").error_code(),
            "UNKNOWN_PROPERTY"
        );
        assert_eq!(
            EnumError::invalid_property_usage("x", "filter").error_code(),
            "INVALID_PROPERTY_USAGE"
        );
        assert_eq!(
            EnumError::query_not_supported("x").error_code(),
            "QUERY_NOT_SUPPORTED"
        );
        assert_eq!(
            EnumError::result_not_supported("x").error_code(),
            "RESULT_NOT_SUPPORTED"
        );
        assert_eq!(
            EnumError::object_not_found("x").error_code(),
            "OBJECT_NOT_FOUND"
        );
        assert_eq!(
            EnumError::connection_lost("x").error_code(),
            "CONNECTION_LOST"
        );
        assert_eq!(
            EnumError::execution_failed("sqlite", "x").error_code(),
            "EXECUTION_FAILED"
        );
        assert_eq!(EnumError::invalid_input("x").error_code(), "INVALID_INPUT");
        assert_eq!(EnumError::config_error("x").error_code(), "CONFIG_ERROR");
        assert_eq!(EnumError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_messages() {
        let err = EnumError::unresolved_urn("Widget");
        assert_eq!(err.message(), "Urn could not be resolved at level Widget");

        let err = EnumError::syntax(XPathErrorCode::InvalidNumArgs, "count()");
        assert!(err.message().contains("InvalidNumArgs"));
        assert!(err.message().contains("count()"));

        let err = EnumError::execution_failed("sqlite", "disk I/O error");
        assert!(err.message().contains("sqlite"));
        assert!(err.message().contains("disk I/O error"));
    }

    #[test]
    fn test_syntax_code_accessor() {
        let err = EnumError::syntax(XPathErrorCode::NodeSetExpected, "[");
        assert_eq!(err.syntax_code(), Some(XPathErrorCode::NodeSetExpected));
        assert_eq!(EnumError::internal("x").syntax_code(), None);
    }
}

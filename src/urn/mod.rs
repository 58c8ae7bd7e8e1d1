//! Urns
//!
//! An urn addresses objects in the level hierarchy with the restricted XPath
//! dialect, e.g. `Server/Database[@Name='Foo']/Table[@Schema='dbo']`.
//!
//! # Lifecycle
//! The string is compiled into an [`XPathExpression`] on first access and the
//! result is kept on the value. Changing the string drops the compiled form.
//!
//! # Equality
//! Urns compare by hash first, then block by block (level names plus
//! structurally equal filters). Urns that do not compile compare as strings.

mod block;

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::{self, CompareOptions};

pub use block::{XPathExpression, XPathExpressionBlock};

/// Double every single quote so the value can sit inside `'...'`
#[must_use]
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        out.push(c);
        if c == '\'' {
            out.push(c);
        }
    }
    out
}

/// Collapse doubled single quotes
#[must_use]
pub fn unescape_string(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut skip_next_quote = false;
    for c in escaped.chars() {
        if c == '\'' {
            if skip_next_quote {
                skip_next_quote = false;
                continue;
            }
            skip_next_quote = true;
        } else {
            skip_next_quote = false;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Urn {
    value: String,
    compiled: OnceLock<XPathExpression>,
}

impl Urn {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            compiled: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.compiled = OnceLock::new();
    }

    /// Compiled form, built on first call
    pub fn expression(&self) -> Result<&XPathExpression> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled);
        }
        let compiled = XPathExpression::compile(&self.value)?;
        Ok(self.compiled.get_or_init(|| compiled))
    }

    /// Name of the leaf level, empty when there is none
    pub fn type_name(&self) -> Result<String> {
        let expression = self.expression()?;
        Ok(expression.blocks().last().map(|b| b.name().to_string()).unwrap_or_default())
    }

    /// Level names from the top of the hierarchy down to the leaf
    pub fn types(&self) -> Result<Vec<String>> {
        Ok(self.expression()?.blocks().iter().map(|b| b.name().to_string()).collect())
    }

    /// Urn without its last step
    ///
    /// Scans backward for the last `/` outside a quoted string; `None` when
    /// there is no such separator.
    #[must_use]
    pub fn parent(&self) -> Option<Urn> {
        let bytes = self.value.as_bytes();
        let mut in_string = false;
        let mut i = bytes.len();
        while i > 0 {
            i -= 1;
            match bytes[i] {
                b'/' if !in_string => return Some(Urn::new(&self.value[..i])),
                b'\'' => {
                    if i > 0 && bytes[i - 1] == b'\'' {
                        i -= 1;
                    } else {
                        in_string = !in_string;
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Fixed value of `attribute` on the nearest level named `level`
    pub fn attribute(&self, attribute: &str, level: &str) -> Result<Option<String>> {
        Ok(self.expression()?.attribute(attribute, level))
    }

    /// Fixed value of `attribute` on the leaf level
    pub fn leaf_attribute(&self, attribute: &str) -> Result<Option<String>> {
        let level = self.type_name()?;
        self.attribute(attribute, &level)
    }

    pub fn name_for_type(&self, level: &str) -> Result<Option<String>> {
        self.attribute("Name", level)
    }

    #[must_use]
    pub fn is_valid_urn(&self) -> bool {
        self.expression().is_ok()
    }

    /// Valid and free of predicates on every level
    #[must_use]
    pub fn is_valid_urn_skeleton(&self) -> bool {
        self.expression().is_ok_and(|x| x.blocks().iter().all(|b| b.filter().is_none()))
    }

    #[must_use]
    pub fn hash_code(&self) -> u64 {
        match self.expression() {
            Ok(expression) if !self.value.is_empty() => expression.hash_code(),
            _ => filter::hash_str(&self.value),
        }
    }

    /// Compare two urns; `None` options use the hash shortcut
    #[must_use]
    pub fn compare(a: &Urn, b: &Urn, options: Option<CompareOptions>) -> bool {
        if options.is_none() && a.hash_code() != b.hash_code() {
            return false;
        }
        match (a.expression(), b.expression()) {
            (Ok(x), Ok(y)) => x.equivalent(y, options.unwrap_or_default()),
            _ => a.value == b.value,
        }
    }
}

impl PartialEq for Urn {
    fn eq(&self, other: &Self) -> bool {
        Self::compare(self, other, None)
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Urn {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Urn {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_round_trip() {
        for raw in ["", "plain", "O'Neil", "''", "a'b'c'", "'"] {
            assert_eq!(unescape_string(&escape_string(raw)), raw);
        }
        assert_eq!(escape_string("it's"), "it''s");
        assert_eq!(unescape_string("it''s"), "it's");
    }

    #[test]
    fn test_parent() {
        let urn = Urn::new("Server/Database[@Name='Foo']/Table[@Schema='dbo']");
        assert_eq!(
            urn.parent().unwrap().value(),
            "Server/Database[@Name='Foo']"
        );
        assert_eq!(Urn::new("Server").parent(), None);
    }

    #[test]
    fn test_parent_skips_quoted_slash() {
        let urn = Urn::new("Server/Database[@Name='a/b']");
        assert_eq!(urn.parent().unwrap().value(), "Server");

        let urn = Urn::new("Server/Database[@Name='it''s/x']");
        assert_eq!(urn.parent().unwrap().value(), "Server");
    }

    #[test]
    fn test_type_and_attributes() {
        let urn = Urn::new("Server/Database[@Name='Foo']/Table[@Name='t' and @Schema='dbo']");
        assert_eq!(urn.type_name().unwrap(), "Table");
        assert_eq!(urn.types().unwrap(), vec!["Server", "Database", "Table"]);
        assert_eq!(
            urn.name_for_type("Database").unwrap().as_deref(),
            Some("Foo")
        );
        assert_eq!(
            urn.leaf_attribute("Schema").unwrap().as_deref(),
            Some("dbo")
        );
        assert_eq!(urn.attribute("Schema", "Server").unwrap(), None);
    }

    #[test]
    fn test_validity() {
        assert!(Urn::new("Server/Database").is_valid_urn());
        assert!(Urn::new("Server/Database").is_valid_urn_skeleton());
        assert!(Urn::new("Server/Database[@Name='x']").is_valid_urn());
        assert!(!Urn::new("Server/Database[@Name='x']").is_valid_urn_skeleton());
        assert!(!Urn::new("Server/Database[@Name='x'").is_valid_urn());
        assert!(!Urn::new("").is_valid_urn());
    }

    #[test]
    fn test_equality_ignores_whitespace() {
        let a = Urn::new("Server/Database[@Name='Foo' and @ID=1]");
        let b = Urn::new("Server/Database[ @Name = 'Foo'  and  @ID = 1 ]");
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a, Urn::new("Server/Database[@Name='Bar' and @ID=1]"));
    }

    #[test]
    fn test_compare_ignore_case() {
        let a = Urn::new("Server/Database[@Name='FOO']");
        let b = Urn::new("Server/Database[@Name='foo']");
        assert!(!Urn::compare(&a, &b, None));
        assert!(Urn::compare(&a, &b, Some(CompareOptions { ignore_case: true })));
    }

    #[test]
    fn test_set_value_recompiles() {
        let mut urn = Urn::new("Server");
        assert_eq!(urn.type_name().unwrap(), "Server");
        urn.set_value("Server/Login");
        assert_eq!(urn.type_name().unwrap(), "Login");
    }

    #[test]
    fn test_serde_as_string() {
        let urn: Urn = serde_json::from_str("\"Server/Database\"").unwrap();
        assert_eq!(urn.value(), "Server/Database");
        assert_eq!(serde_json::to_string(&urn).unwrap(), "\"Server/Database\"");
    }
}

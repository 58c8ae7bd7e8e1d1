//! Filter Trees
//!
//! Backend-agnostic boolean expression tree derived from a parsed predicate.
//! A filter only references attributes of its own level, constants, the
//! comparison/logical operators and a small set of functions; everything else
//! is rejected during [`translate`](translate::translate).
//!
//! # Identity
//! - Structural equality (`PartialEq`) and [`FilterNode::equivalent`] for
//!   case-insensitive comparison
//! - [`FilterNode::hash_code`] combines child hashes with XOR so equal trees hash equally
//! - Attribute names are interned process-wide ([`AttributeName`])

pub mod decoder;
pub mod translate;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};
use string_cache::DefaultAtom;

pub use decoder::{escape_like_pattern, escape_sql_string, FilterDecoder, SqlFilterCallback};
pub use translate::translate;

/// Return the process-wide atom for `name`
pub(crate) fn intern(name: &str) -> DefaultAtom {
    DefaultAtom::from(name)
}

/// Interned attribute name
///
/// Every `AttributeName` built from the same string shares one atom in the
/// global `string_cache` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeName(DefaultAtom);

impl AttributeName {
    pub fn new(name: &str) -> Self {
        Self(intern(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if both names resolve to the same interned atom
    #[must_use]
    pub fn is_same_instance(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for AttributeName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttributeName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AttributeName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstantKind {
    Number,
    Boolean,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Or,
    And,
    Neg,
}

impl FilterOperator {
    /// XPath spelling used by `Display`
    #[must_use]
    pub const fn as_xpath(&self) -> &'static str {
        match self {
            Self::And => " and ",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ne => "!=",
            Self::Or => " or ",
            Self::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterFunctionKind {
    True,
    False,
    String,
    Contains,
    UserDefined,
    Not,
    Boolean,
    Like,
    In,
}

impl FilterFunctionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::String => "string",
            Self::Contains => "contains",
            Self::UserDefined => "userdefined",
            Self::Not => "not",
            Self::Boolean => "boolean",
            Self::Like => "like",
            Self::In => "in",
        }
    }
}

/// Options for [`FilterNode::equivalent`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare string constants ignoring case
    pub ignore_case: bool,
}

/// Filter tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FilterNode {
    Attribute {
        name: AttributeName,
    },
    Constant {
        value: String,
        kind: ConstantKind,
    },
    Operator {
        op: FilterOperator,
        left: Box<FilterNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        right: Option<Box<FilterNode>>,
    },
    Function {
        function: FilterFunctionKind,
        name: String,
        args: Vec<FilterNode>,
    },
    Group {
        inner: Box<FilterNode>,
    },
}

impl FilterNode {
    pub fn attribute(name: &str) -> Self {
        Self::Attribute {
            name: AttributeName::new(name),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Constant {
            value: value.into(),
            kind: ConstantKind::String,
        }
    }

    pub fn number(value: f64) -> Self {
        Self::Constant {
            value: format_number(value),
            kind: ConstantKind::Number,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::Constant {
            value: value.to_string(),
            kind: ConstantKind::Boolean,
        }
    }

    pub fn binary(op: FilterOperator, left: FilterNode, right: FilterNode) -> Self {
        Self::Operator {
            op,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn function(function: FilterFunctionKind, args: Vec<FilterNode>) -> Self {
        Self::Function {
            function,
            name: function.as_str().to_string(),
            args,
        }
    }

    pub fn user_defined(name: impl Into<String>, args: Vec<FilterNode>) -> Self {
        Self::Function {
            function: FilterFunctionKind::UserDefined,
            name: name.into(),
            args,
        }
    }

    pub fn group(inner: FilterNode) -> Self {
        Self::Group {
            inner: Box::new(inner),
        }
    }

    /// Conjoin two filters; `None` on either side yields the other
    #[must_use]
    pub fn and(left: Option<FilterNode>, right: Option<FilterNode>) -> Option<FilterNode> {
        match (left, right) {
            (Some(l), Some(r)) => Some(Self::binary(FilterOperator::And, l, r)),
            (l, None) => l,
            (None, r) => r,
        }
    }

    /// Children in evaluation order
    #[must_use]
    pub fn children(&self) -> Vec<&FilterNode> {
        match self {
            Self::Attribute { .. } | Self::Constant { .. } => Vec::new(),
            Self::Operator { left, right, .. } => {
                let mut out = vec![left.as_ref()];
                if let Some(right) = right {
                    out.push(right.as_ref());
                }
                out
            }
            Self::Function { args, .. } => args.iter().collect(),
            Self::Group { inner } => vec![inner.as_ref()],
        }
    }

    /// Structural comparison with configurable string sensitivity
    #[must_use]
    pub fn equivalent(&self, other: &FilterNode, options: CompareOptions) -> bool {
        match (self, other) {
            (Self::Attribute { name: a }, Self::Attribute { name: b }) => a == b,
            (
                Self::Constant {
                    value: va,
                    kind: ka,
                },
                Self::Constant {
                    value: vb,
                    kind: kb,
                },
            ) => {
                ka == kb
                    && if options.ignore_case {
                        va.to_lowercase() == vb.to_lowercase()
                    } else {
                        va == vb
                    }
            }
            (Self::Operator { op: oa, .. }, Self::Operator { op: ob, .. }) => {
                oa == ob && children_equivalent(self, other, options)
            }
            (
                Self::Function {
                    function: fa,
                    name: na,
                    ..
                },
                Self::Function {
                    function: fb,
                    name: nb,
                    ..
                },
            ) => fa == fb && na == nb && children_equivalent(self, other, options),
            (Self::Group { inner: a }, Self::Group { inner: b }) => a.equivalent(b, options),
            _ => false,
        }
    }

    /// Structural hash; equal trees hash equally
    #[must_use]
    pub fn hash_code(&self) -> u64 {
        match self {
            Self::Attribute { name } => hash_of(name.as_str()),
            Self::Constant { value, .. } => hash_of(value),
            Self::Operator { op, .. } => hash_of(op) ^ children_hash(self),
            Self::Function { function, .. } => hash_of(function) ^ children_hash(self),
            Self::Group { .. } => children_hash(self),
        }
    }
}

fn children_equivalent(a: &FilterNode, b: &FilterNode, options: CompareOptions) -> bool {
    let (ca, cb) = (a.children(), b.children());
    ca.len() == cb.len()
        && ca
            .iter()
            .zip(cb.iter())
            .all(|(x, y)| x.equivalent(y, options))
}

fn children_hash(node: &FilterNode) -> u64 {
    node.children()
        .iter()
        .fold(u64::MAX, |acc, child| acc ^ child.hash_code())
}

pub(crate) fn hash_str(value: &str) -> u64 {
    hash_of(value)
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Render a number the way it is written in an expression (`1`, not `1.0`)
#[must_use]
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attribute { name } => write!(f, "@{name}"),
            Self::Constant { value, kind } => match kind {
                ConstantKind::String => write!(f, "'{}'", crate::urn::escape_string(value)),
                ConstantKind::Boolean => {
                    if value.eq_ignore_ascii_case("true") {
                        f.write_str("true()")
                    } else {
                        f.write_str("false()")
                    }
                }
                ConstantKind::Number => f.write_str(value),
            },
            Self::Operator {
                op: FilterOperator::Neg,
                left,
                ..
            } => write!(f, "-{left}"),
            Self::Operator { op, left, right } => {
                write!(f, "{left}{}", op.as_xpath())?;
                if let Some(right) = right {
                    write!(f, "{right}")?;
                }
                Ok(())
            }
            Self::Function {
                function,
                name,
                args,
            } => {
                let shown = if *function == FilterFunctionKind::UserDefined {
                    name.as_str()
                } else {
                    function.as_str()
                };
                write!(f, "{shown}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Group { inner } => write!(f, "({inner})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_are_interned() {
        let a = AttributeName::new("Schema");
        let b = AttributeName::new(&String::from("Schema"));
        assert_eq!(a, b);
        assert!(a.is_same_instance(&b));

        let c = AttributeName::new("Owner");
        assert!(!a.is_same_instance(&c));
        assert!(c < a);
        assert_eq!(format!("{a}"), "Schema");
    }

    #[test]
    fn test_structural_equality() {
        let name_is = |op| {
            FilterNode::binary(op, FilterNode::attribute("Name"), FilterNode::string("x"))
        };
        let a = name_is(FilterOperator::Eq);
        let b = name_is(FilterOperator::Eq);
        let c = name_is(FilterOperator::Ne);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.hash_code(), b.hash_code());
    }

    #[test]
    fn test_constant_kind_matters() {
        let s = FilterNode::string("1");
        let n = FilterNode::number(1.0);
        assert!(!s.equivalent(&n, CompareOptions::default()));
    }

    #[test]
    fn test_equivalent_ignore_case() {
        let a = FilterNode::string("Dbo");
        let b = FilterNode::string("dbo");
        assert!(!a.equivalent(&b, CompareOptions::default()));
        assert!(a.equivalent(&b, CompareOptions { ignore_case: true }));
    }

    #[test]
    fn test_display() {
        let node = FilterNode::binary(
            FilterOperator::And,
            FilterNode::binary(
                FilterOperator::Eq,
                FilterNode::attribute("Name"),
                FilterNode::string("O'Neil"),
            ),
            FilterNode::group(FilterNode::binary(
                FilterOperator::Or,
                FilterNode::binary(
                    FilterOperator::Ne,
                    FilterNode::attribute("ID"),
                    FilterNode::number(3.0),
                ),
                FilterNode::function(
                    FilterFunctionKind::Not,
                    vec![FilterNode::attribute("IsSystemObject")],
                ),
            )),
        );
        assert_eq!(
            node.to_string(),
            "@Name='O''Neil' and (@ID!=3 or not(@IsSystemObject))"
        );
    }

    #[test]
    fn test_display_negate_and_boolean() {
        let neg = FilterNode::Operator {
            op: FilterOperator::Neg,
            left: Box::new(FilterNode::number(2.5)),
            right: None,
        };
        assert_eq!(neg.to_string(), "-2.5");
        assert_eq!(FilterNode::boolean(true).to_string(), "true()");
        let udf = FilterNode::user_defined("is_null", vec![FilterNode::attribute("X")]);
        assert_eq!(udf.to_string(), "is_null(@X)");
    }

    #[test]
    fn test_and_combinator() {
        let a = FilterNode::attribute("A");
        assert_eq!(FilterNode::and(Some(a.clone()), None), Some(a.clone()));
        assert_eq!(FilterNode::and(None, Some(a.clone())), Some(a.clone()));
        assert!(matches!(
            FilterNode::and(Some(a.clone()), Some(a)),
            Some(FilterNode::Operator {
                op: FilterOperator::And,
                ..
            })
        ));
        assert_eq!(FilterNode::and(None, None), None);
    }
}

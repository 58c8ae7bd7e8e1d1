//! Filter to SQL
//!
//! Renders a [`FilterNode`] tree as a T-SQL boolean expression for a `WHERE`
//! clause. The level owning the filter supplies a [`SqlFilterCallback`] that
//! maps attribute names to column expressions and may rewrite constants.
//!
//! # Constants
//! - Without parameterization, string constants become `N'...'` with quotes doubled
//! - With parameterization, every constant is wrapped as `<msparam>value</msparam>`
//!   (with `&` and `<` entity-encoded) and later bound as a positional parameter
//! - Inside `contains`, `like` and `in` parameterization is suspended
//!
//! # Functions
//! | filter                | SQL                                   |
//! |-----------------------|---------------------------------------|
//! | `true()` / `false()`  | `1` / `0`                             |
//! | `contains(a, 'p')`    | `a like N'%p%'` (pattern escaped)     |
//! | `like(a, 'p')`        | `a like N'p'`                         |
//! | `in(a, '1,2')`        | `a in (1,2)`                          |
//! | `not(a)`              | `not(a)`                              |
//! | `BitWiseAnd(a, b)`    | `(a) & (b)`                           |
//! | `is_null(a)`          | `(a) is null`                         |
//! | `datetime(a)`         | `convert(datetime, a, 121)`           |
//! | `datetime2(a)` etc.   | `cast(a AS datetime2)`                |
//!
//! Unknown user-defined functions render nothing.

use super::{ConstantKind, FilterFunctionKind, FilterNode, FilterOperator};
use crate::engine::{encode_parameter, PARAM_CLOSE, PARAM_OPEN};
use crate::error::{EnumError, Result};

/// Hooks a level provides to the decoder
pub trait SqlFilterCallback {
    /// Column expression for a filter attribute
    fn add_property_for_filter(&mut self, name: &str) -> Result<String>;

    /// Final text for a constant (identity by default)
    fn add_constant_for_filter(&mut self, value: &str) -> String {
        value.to_string()
    }

    fn supports_parameterization(&self) -> bool {
        false
    }
}

/// Escape `%`, `_` and `[` so a value matches literally inside `LIKE`
#[must_use]
pub fn escape_like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => out.push_str("[%]"),
            '_' => out.push_str("[_]"),
            '[' => out.push_str("[[]"),
            other => out.push(other),
        }
    }
    out
}

/// Double embedded single quotes
#[must_use]
pub fn escape_sql_string(value: &str) -> String {
    crate::urn::escape_string(value)
}

/// Cast lowering for the date/time helpers
const CASTS: &[(&str, &str)] = &[
    ("datetime2", "datetime2"),
    ("datetimeoffset", "datetimeoffset"),
    ("timespan", "bigint"),
    ("date", "date"),
    ("time", "time"),
];

pub struct FilterDecoder<'a, C: SqlFilterCallback + ?Sized> {
    callback: &'a mut C,
    string_prefix: String,
    in_contains: bool,
    in_like: bool,
    suspended: u32,
}

impl<'a, C: SqlFilterCallback + ?Sized> FilterDecoder<'a, C> {
    pub fn new(callback: &'a mut C) -> Self {
        Self {
            callback,
            string_prefix: "N".to_string(),
            in_contains: false,
            in_like: false,
            suspended: 0,
        }
    }

    /// Prefix written before string literals (`N` for unicode literals)
    #[must_use]
    pub fn with_string_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.string_prefix = prefix.into();
        self
    }

    pub fn string_prefix(&self) -> &str {
        &self.string_prefix
    }

    /// Render `node` as a SQL fragment
    pub fn sql(&mut self, node: &FilterNode) -> Result<String> {
        self.in_contains = false;
        self.in_like = false;
        self.suspended = 0;
        let mut out = String::new();
        self.decode(node, &mut out)?;
        Ok(out)
    }

    fn parameterized(&self) -> bool {
        self.suspended == 0 && self.callback.supports_parameterization()
    }

    fn decode(&mut self, node: &FilterNode, out: &mut String) -> Result<()> {
        match node {
            FilterNode::Operator { op, left, right } => {
                self.decode(left, out)?;
                out.push_str(sql_operator(*op)?);
                if let Some(right) = right {
                    self.decode(right, out)?;
                }
            }
            FilterNode::Constant { value, kind } => self.decode_constant(value, *kind, out),
            FilterNode::Group { inner } => {
                out.push('(');
                self.decode(inner, out)?;
                out.push(')');
            }
            FilterNode::Attribute { name } => {
                let column = self.callback.add_property_for_filter(name.as_str())?;
                out.push_str(&column);
            }
            FilterNode::Function {
                function,
                name,
                args,
            } => self.decode_function(*function, name, args, out)?,
        }
        Ok(())
    }

    fn decode_constant(&mut self, value: &str, kind: ConstantKind, out: &mut String) {
        let value = self.callback.add_constant_for_filter(value);
        if self.parameterized() {
            out.push_str(PARAM_OPEN);
            out.push_str(&encode_parameter(&value));
            out.push_str(PARAM_CLOSE);
            return;
        }
        let quoted = !self.in_contains && !self.in_like && kind == ConstantKind::String;
        if quoted {
            out.push_str(&self.string_prefix);
            out.push('\'');
        }
        let value = if self.in_contains { escape_like_pattern(&value) } else { value };
        out.push_str(&escape_sql_string(&value));
        if quoted {
            out.push('\'');
        }
    }

    fn decode_function(
        &mut self,
        function: FilterFunctionKind,
        name: &str,
        args: &[FilterNode],
        out: &mut String,
    ) -> Result<()> {
        match function {
            FilterFunctionKind::True => out.push('1'),
            FilterFunctionKind::False => out.push('0'),
            FilterFunctionKind::String | FilterFunctionKind::Boolean => {
                self.decode(arg(args, 0, name)?, out)?
            }
            FilterFunctionKind::Not => {
                out.push_str("not(");
                self.decode(arg(args, 0, name)?, out)?;
                out.push(')');
            }
            FilterFunctionKind::Contains => {
                self.suspended += 1;
                let result = self.decode_pattern(args, name, true, out);
                self.suspended -= 1;
                result?;
            }
            FilterFunctionKind::Like => {
                self.suspended += 1;
                let result = self.decode_pattern(args, name, false, out);
                self.suspended -= 1;
                result?;
            }
            FilterFunctionKind::In => {
                self.suspended += 1;
                let result = self.decode_in(args, name, out);
                self.suspended -= 1;
                result?;
            }
            FilterFunctionKind::UserDefined => self.decode_user_defined(name, args, out)?,
        }
        Ok(())
    }

    fn decode_pattern(
        &mut self,
        args: &[FilterNode],
        name: &str,
        contains: bool,
        out: &mut String,
    ) -> Result<()> {
        self.decode(arg(args, 0, name)?, out)?;
        let wildcard = if contains { "%" } else { "" };
        out.push_str(&format!(" like {}'{wildcard}", self.string_prefix));
        if contains {
            self.in_contains = true;
        } else {
            self.in_like = true;
        }
        let result = self.decode(arg(args, 1, name)?, out);
        self.in_contains = false;
        self.in_like = false;
        result?;
        out.push_str(wildcard);
        out.push('\'');
        Ok(())
    }

    fn decode_in(&mut self, args: &[FilterNode], name: &str, out: &mut String) -> Result<()> {
        self.decode(arg(args, 0, name)?, out)?;
        let list = match arg(args, 1, name)? {
            FilterNode::Constant { value, .. } => value,
            other => {
                return Err(EnumError::invalid_query_expression(format!(
                    "in() expects a constant list, got {other}"
                )))
            }
        };
        for part in list.split(',') {
            if part.trim().parse::<i32>().is_err() {
                return Err(EnumError::invalid_query_expression(format!(
                    "in() accepts only a comma separated list of integers, got '{list}'"
                )));
            }
        }
        out.push_str(&format!(" in ({list})"));
        Ok(())
    }

    fn decode_user_defined(
        &mut self,
        name: &str,
        args: &[FilterNode],
        out: &mut String,
    ) -> Result<()> {
        match name {
            "BitWiseAnd" => {
                out.push('(');
                self.decode(arg(args, 0, name)?, out)?;
                out.push_str(") & (");
                self.decode(arg(args, 1, name)?, out)?;
                out.push(')');
            }
            "is_null" => {
                out.push('(');
                self.decode(arg(args, 0, name)?, out)?;
                out.push_str(") is null");
            }
            "datetime" => {
                out.push_str("convert(datetime, ");
                self.decode(arg(args, 0, name)?, out)?;
                out.push_str(", 121)");
            }
            _ => {
                if let Some((_, sql_type)) = CASTS.iter().find(|(n, _)| *n == name) {
                    out.push_str("cast(");
                    self.decode(arg(args, 0, name)?, out)?;
                    out.push_str(&format!(" AS {sql_type})"));
                } else {
                    tracing::debug!(
                        function = name,
                        "dropping unknown user-defined filter function"
                    );
                }
            }
        }
        Ok(())
    }
}

fn sql_operator(op: FilterOperator) -> Result<&'static str> {
    Ok(match op {
        FilterOperator::Lt => "<",
        FilterOperator::Gt => ">",
        FilterOperator::Le => "<=",
        FilterOperator::Ge => ">=",
        FilterOperator::Eq => "=",
        FilterOperator::Ne => "<>",
        FilterOperator::Or => " or ",
        FilterOperator::And => " and ",
        FilterOperator::Neg => {
            return Err(EnumError::invalid_query_expression("unknown operator"))
        }
    })
}

fn arg<'n>(args: &'n [FilterNode], index: usize, function: &str) -> Result<&'n FilterNode> {
    args.get(index).ok_or_else(|| {
        EnumError::invalid_query_expression(format!(
            "{function}() is missing argument {}",
            index + 1
        ))
    })
}

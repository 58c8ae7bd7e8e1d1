//! Statement builder
//!
//! Each SQL level contributes its own table, join condition, columns, `WHERE`
//! terms and ordering. A child merges the statement its parent handed down,
//! so the leaf ends up holding one `SELECT` across the whole urn.

use std::collections::BTreeMap;

use crate::enumerator::request::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FromClause {
    source: String,
    /// Join condition against everything before it; `None` cross joins
    join: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementBuilder {
    fields: Vec<(String, String)>,
    from: Vec<FromClause>,
    wheres: Vec<String>,
    order_by: Vec<String>,
    distinct: bool,
}

impl StatementBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result column `expression AS [alias]`
    pub fn add_field(&mut self, expression: impl Into<String>, alias: impl Into<String>) {
        self.fields.push((expression.into(), alias.into()));
    }

    pub fn add_from(&mut self, source: impl Into<String>) {
        self.from.push(FromClause {
            source: source.into(),
            join: None,
        });
    }

    /// Join condition for the first source against the parent's sources
    pub fn set_parent_join(&mut self, condition: Option<String>) {
        if let Some(first) = self.from.first_mut() {
            first.join = condition;
        }
    }

    pub fn add_where(&mut self, condition: impl Into<String>) {
        self.wheres.push(condition.into());
    }

    pub fn add_order_by(&mut self, expression: &str, direction: Direction) {
        self.order_by.push(format!("{expression} {}", direction.as_sql()));
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    /// Column aliases in result order
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        self.fields.iter().map(|(_, alias)| alias.as_str()).collect()
    }

    #[must_use]
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Fold the parent's statement into this one
    ///
    /// Parent sources come first; own columns come before the parent's;
    /// parent `WHERE` terms and ordering come before the own ones.
    pub fn merge_parent(&mut self, parent: StatementBuilder) {
        let mut from = parent.from;
        from.append(&mut self.from);
        self.from = from;

        self.fields.extend(parent.fields);

        let mut wheres = parent.wheres;
        wheres.append(&mut self.wheres);
        self.wheres = wheres;

        let mut order_by = parent.order_by;
        order_by.append(&mut self.order_by);
        self.order_by = order_by;

        self.distinct |= parent.distinct;
    }

    /// Render the `SELECT`
    #[must_use]
    pub fn sql_statement(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        self.write_fields(&mut sql, false);
        for (i, clause) in self.from.iter().enumerate() {
            match (&clause.join, i) {
                (_, 0) => {
                    sql.push_str(&format!("\nFROM {}", clause.source));
                }
                (Some(condition), _) => {
                    sql.push_str(&format!("\nINNER JOIN {} ON {condition}", clause.source));
                }
                (None, _) => {
                    sql.push_str(&format!("\nCROSS JOIN {}", clause.source));
                }
            }
        }
        if !self.wheres.is_empty() {
            let terms: Vec<String> = self.wheres.iter().map(|w| format!("({w})")).collect();
            sql.push_str(&format!("\nWHERE {}", terms.join(" AND ")));
        }
        if !self.order_by.is_empty() {
            sql.push_str(&format!("\nORDER BY {}", self.order_by.join(", ")));
        }
        sql
    }

    /// Statement with the same columns and no rows
    #[must_use]
    pub fn empty_result_statement(&self) -> String {
        let mut sql = String::from("SELECT ");
        self.write_fields(&mut sql, true);
        sql.push_str(" WHERE 1 = 0");
        sql
    }

    fn write_fields(&self, sql: &mut String, null_values: bool) {
        if self.fields.is_empty() {
            sql.push_str("NULL AS [_]");
            return;
        }
        for (i, (expression, alias)) in self.fields.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let expression = if null_values { "NULL" } else { expression.as_str() };
            sql.push_str(&format!("{expression} AS [{alias}]"));
        }
    }
}

/// Partial result a SQL level hands to its child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlEnumResult {
    pub statement: StatementBuilder,
    /// Expressions for the link fields the child asked for
    pub link_sql: BTreeMap<String, String>,
}

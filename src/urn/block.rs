//! Compiled urn: one block per hierarchy level

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use string_cache::DefaultAtom;

use crate::error::{EnumError, Result};
use crate::filter::{
    self, translate, CompareOptions, FilterFunctionKind, FilterNode, FilterOperator,
};
use crate::xpath::{self, AstNode, AxisKind, NodeTest};

/// One level of a compiled urn: the level name and its local filter
///
/// Fixed properties (attributes pinned to a constant by an `and`-chain of
/// equalities) are computed on first use and dropped whenever the filter
/// changes.
#[derive(Debug, Clone)]
pub struct XPathExpressionBlock {
    name: DefaultAtom,
    filter: Option<Arc<FilterNode>>,
    fixed: OnceLock<BTreeMap<String, FilterNode>>,
}

impl XPathExpressionBlock {
    pub fn new(name: &str, filter: Option<FilterNode>) -> Self {
        Self {
            name: filter::intern(name),
            filter: filter.map(Arc::new),
            fixed: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn filter(&self) -> Option<&FilterNode> {
        self.filter.as_deref()
    }

    pub fn set_filter(&mut self, filter: Option<FilterNode>) {
        self.filter = filter.map(Arc::new);
        self.fixed = OnceLock::new();
    }

    /// Shallow copy; the filter tree is shared
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Attributes pinned to a constant (or `true()`/`false()`) by the filter
    ///
    /// Only equalities reachable through `and` are recognised; the first
    /// occurrence of an attribute wins. Anything else stops the walk, keeping
    /// what was collected so far.
    pub fn fixed_properties(&self) -> &BTreeMap<String, FilterNode> {
        self.fixed.get_or_init(|| {
            let mut fixed = BTreeMap::new();
            if let Some(filter) = self.filter.as_deref() {
                collect_fixed(filter, &mut fixed);
            }
            fixed
        })
    }

    /// Value of a fixed attribute as text
    #[must_use]
    pub fn attribute_from_filter(&self, attribute: &str) -> Option<String> {
        self.fixed_properties().get(attribute).and_then(|node| match node {
            FilterNode::Constant { value, .. } => Some(value.clone()),
            FilterNode::Function {
                function: FilterFunctionKind::True,
                ..
            } => Some("true".to_string()),
            FilterNode::Function {
                function: FilterFunctionKind::False,
                ..
            } => Some("false".to_string()),
            _ => None,
        })
    }

    /// Constant of a filter that is exactly one `@attr = constant` equality
    #[must_use]
    pub fn unique_attribute(filter: Option<&FilterNode>) -> Option<String> {
        match filter? {
            FilterNode::Operator {
                op: FilterOperator::Eq,
                left,
                right: Some(right),
            } => {
                match (left.as_ref(), right.as_ref()) {
                    (FilterNode::Attribute { .. }, FilterNode::Constant { value, .. })
                    | (FilterNode::Constant { value, .. }, FilterNode::Attribute { .. }) => {
                        Some(value.clone())
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn hash_code(&self) -> u64 {
        let mut hash = filter::hash_str(&self.name);
        if let Some(filter) = &self.filter {
            hash ^= filter.hash_code();
        }
        hash
    }

    #[must_use]
    pub fn equivalent(&self, other: &Self, options: CompareOptions) -> bool {
        if self.name != other.name {
            return false;
        }
        match (self.filter(), other.filter()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equivalent(b, options),
            _ => false,
        }
    }
}

impl PartialEq for XPathExpressionBlock {
    fn eq(&self, other: &Self) -> bool {
        self.equivalent(other, CompareOptions::default())
    }
}

impl fmt::Display for XPathExpressionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(filter) = &self.filter {
            write!(f, "[{filter}]")?;
        }
        Ok(())
    }
}

fn collect_fixed(node: &FilterNode, fixed: &mut BTreeMap<String, FilterNode>) -> bool {
    match node {
        FilterNode::Operator {
            op: FilterOperator::Eq,
            left,
            right: Some(right),
        } => {
            let pinned = match (left.as_ref(), right.as_ref()) {
                (FilterNode::Attribute { name }, value)
                | (value, FilterNode::Attribute { name }) => Some((name, value)),
                _ => None,
            };
            if let Some((name, value)) = pinned {
                let accepted = matches!(
                    value,
                    FilterNode::Constant { .. }
                        | FilterNode::Function {
                            function: FilterFunctionKind::True | FilterFunctionKind::False,
                            ..
                        }
                );
                if accepted {
                    fixed
                        .entry(name.as_str().to_string())
                        .or_insert_with(|| value.clone());
                }
            }
            true
        }
        FilterNode::Operator {
            op: FilterOperator::And,
            left,
            right: Some(right),
        } => {
            collect_fixed(left, fixed) && collect_fixed(right, fixed)
        }
        _ => false,
    }
}

/// Ordered list of level blocks compiled from an urn string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XPathExpression {
    blocks: Vec<XPathExpressionBlock>,
}

impl XPathExpression {
    /// Compile `Level[@a='x']/Child[...]` into blocks
    ///
    /// Each child step becomes one block; several predicates on one step are
    /// conjoined with `and` in source order.
    pub fn compile(urn: &str) -> Result<Self> {
        let ast = xpath::parse(urn)?;
        let mut blocks = Vec::new();
        collect_steps(&ast, &mut blocks)?;
        if blocks.is_empty() {
            return Err(EnumError::invalid_query_expression(format!(
                "'{urn}' does not name a level"
            )));
        }
        Ok(Self { blocks })
    }

    pub fn from_blocks(blocks: Vec<XPathExpressionBlock>) -> Self {
        Self { blocks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn blocks(&self) -> &[XPathExpressionBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&XPathExpressionBlock> {
        self.blocks.get(index)
    }

    /// Fixed attribute of the nearest level named `level`
    #[must_use]
    pub fn attribute(&self, attribute: &str, level: &str) -> Option<String> {
        self.blocks
            .iter()
            .rev()
            .find(|b| b.name() == level)
            .and_then(|b| b.attribute_from_filter(attribute))
    }

    #[must_use]
    pub fn hash_code(&self) -> u64 {
        self.blocks.iter().fold(0, |acc, block| acc ^ block.hash_code())
    }

    #[must_use]
    pub fn equivalent(&self, other: &Self, options: CompareOptions) -> bool {
        self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.equivalent(b, options))
    }
}

impl fmt::Display for XPathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

fn collect_steps(node: &AstNode, blocks: &mut Vec<XPathExpressionBlock>) -> Result<()> {
    match node {
        AstNode::Root => Ok(()),
        AstNode::Axis {
            axis: AxisKind::Child,
            input,
            name,
            test: NodeTest::Name,
            ..
        } => {
            if name.is_empty() {
                return Err(EnumError::invalid_query_expression(
                    "wildcard steps cannot address a level",
                ));
            }
            if let Some(input) = input {
                collect_steps(input, blocks)?;
            }
            blocks.push(XPathExpressionBlock::new(name, None));
            Ok(())
        }
        AstNode::Filter { input, condition } => {
            collect_steps(input, blocks)?;
            let condition = translate(condition)?;
            let block = blocks
                .last_mut()
                .ok_or_else(|| EnumError::invalid_query_expression("predicate without a level"))?;
            let combined = FilterNode::and(block.filter().cloned(), Some(condition));
            block.set_filter(combined);
            Ok(())
        }
        other => Err(EnumError::invalid_query_expression(format!(
            "unsupported step in urn: {}",
            serde_json::to_string(other).unwrap_or_default()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eq(attr: &str, value: FilterNode) -> FilterNode {
        FilterNode::binary(FilterOperator::Eq, FilterNode::attribute(attr), value)
    }

    #[test]
    fn test_compile_levels() {
        let x =
            XPathExpression::compile("Server/Database[@Name='Foo']/Table[@Schema='dbo']").unwrap();
        let names: Vec<_> = x.blocks().iter().map(XPathExpressionBlock::name).collect();
        assert_eq!(names, vec!["Server", "Database", "Table"]);
        assert!(x.get(0).unwrap().filter().is_none());

        let table = x.get(2).unwrap();
        let expected = BTreeMap::from([("Schema".to_string(), FilterNode::string("dbo"))]);
        assert_eq!(table.fixed_properties(), &expected);
        assert_eq!(
            x.get(1).unwrap().attribute_from_filter("Name").as_deref(),
            Some("Foo")
        );
        assert_eq!(table.attribute_from_filter("Name"), None);
    }

    #[test]
    fn test_rooted_urn() {
        let x = XPathExpression::compile("/Server/Database").unwrap();
        assert_eq!(x.len(), 2);
        assert_eq!(x.to_string(), "Server/Database");
    }

    #[test]
    fn test_multiple_predicates_conjoin() {
        let x = XPathExpression::compile("a/b[@z='1'][@y='1']").unwrap();
        let expected = FilterNode::binary(
            FilterOperator::And,
            eq("z", FilterNode::string("1")),
            eq("y", FilterNode::string("1")),
        );
        assert_eq!(x.get(1).unwrap().filter(), Some(&expected));
    }

    #[test]
    fn test_fixed_properties_and_chain() {
        let block = XPathExpressionBlock::new(
            "T",
            Some(FilterNode::binary(
                FilterOperator::And,
                eq("A", FilterNode::string("x")),
                eq("B", FilterNode::string("y")),
            )),
        );
        let keys: Vec<_> = block.fixed_properties().keys().cloned().collect();
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_fixed_properties_ignore_or() {
        let block = XPathExpressionBlock::new(
            "T",
            Some(FilterNode::binary(
                FilterOperator::Or,
                eq("A", FilterNode::string("x")),
                eq("B", FilterNode::string("y")),
            )),
        );
        assert!(block.fixed_properties().is_empty());
    }

    #[test]
    fn test_fixed_properties_boolean_functions() {
        let x =
            XPathExpression::compile("Table[@IsSystemObject=false() and 'dbo'=@Schema]").unwrap();
        let block = x.get(0).unwrap();
        assert_eq!(
            block.attribute_from_filter("IsSystemObject").as_deref(),
            Some("false")
        );
        assert_eq!(
            block.attribute_from_filter("Schema").as_deref(),
            Some("dbo")
        );
    }

    #[test]
    fn test_first_occurrence_wins() {
        let x = XPathExpression::compile("T[@A='1' and @A='2']").unwrap();
        assert_eq!(
            x.get(0).unwrap().attribute_from_filter("A").as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_set_filter_invalidates() {
        let mut block = XPathExpressionBlock::new("T", Some(eq("A", FilterNode::string("x"))));
        assert_eq!(block.fixed_properties().len(), 1);
        block.set_filter(Some(eq("B", FilterNode::number(2.0))));
        assert_eq!(block.attribute_from_filter("A"), None);
        assert_eq!(block.attribute_from_filter("B").as_deref(), Some("2"));
    }

    #[test]
    fn test_unique_attribute() {
        let f = eq("Name", FilterNode::string("x"));
        assert_eq!(
            XPathExpressionBlock::unique_attribute(Some(&f)).as_deref(),
            Some("x")
        );
        let g = FilterNode::binary(FilterOperator::And, f.clone(), f);
        assert_eq!(XPathExpressionBlock::unique_attribute(Some(&g)), None);
        assert_eq!(XPathExpressionBlock::unique_attribute(None), None);
    }

    #[test]
    fn test_block_display_and_copy() {
        let block =
            XPathExpressionBlock::new("Table", Some(eq("Name", FilterNode::string("t"))));
        assert_eq!(block.to_string(), "Table[@Name='t']");
        let copy = block.copy();
        assert_eq!(copy, block);
        assert_eq!(copy.hash_code(), block.hash_code());
    }

    #[test]
    fn test_unsupported_steps() {
        for urn in ["Server/*", "Server/@Name", "Server/..", "Server//Database", "1"] {
            let err = XPathExpression::compile(urn).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_QUERY_EXPRESSION", "urn {urn}");
        }
    }
}

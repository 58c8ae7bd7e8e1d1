//! AST to filter tree rewrite

use super::{ConstantKind, FilterFunctionKind, FilterNode, FilterOperator};
use crate::error::{EnumError, Result};
use crate::xpath::{AstNode, AxisKind, FunctionKind, Literal, OperatorKind, ReturnType};

/// Rewrite a predicate AST into a filter tree
///
/// A `Filter` node contributes only its condition. Axes other than
/// `attribute`, arithmetic, unions, variables and functions outside the
/// filter subset are rejected.
pub fn translate(node: &AstNode) -> Result<FilterNode> {
    match node {
        AstNode::Filter { condition, .. } => translate(condition),
        AstNode::Operator { op, left, right } => {
            let op = map_operator(*op)?;
            let left = Box::new(translate(left)?);
            let right = match right {
                Some(right) => Some(Box::new(translate(right)?)),
                None => None,
            };
            Ok(FilterNode::Operator { op, left, right })
        }
        AstNode::Operand { value, return_type } => translate_constant(value, *return_type),
        AstNode::Group { inner } => Ok(FilterNode::group(translate(inner)?)),
        AstNode::Axis {
            axis: AxisKind::Attribute,
            name,
            ..
        } => {
            if name.is_empty() {
                return Err(EnumError::invalid_query_expression("attribute wildcard in filter"));
            }
            Ok(FilterNode::attribute(name))
        }
        AstNode::Axis { axis, .. } => Err(EnumError::invalid_query_expression(format!(
            "axis '{}' is not supported in a filter",
            axis.as_str()
        ))),
        AstNode::Function {
            function,
            name,
            args,
            ..
        } => {
            let kind = map_function(*function, name)?;
            let args = args.iter().map(translate).collect::<Result<Vec<_>>>()?;
            Ok(FilterNode::Function {
                function: kind,
                name: name.clone(),
                args,
            })
        }
        AstNode::Root => Err(EnumError::invalid_query_expression(
            "root is not supported in a filter",
        )),
        AstNode::Variable { name, .. } => {
            Err(EnumError::invalid_query_expression(format!("variable '${name}' is not supported")))
        }
    }
}

fn map_operator(op: OperatorKind) -> Result<FilterOperator> {
    Ok(match op {
        OperatorKind::Lt => FilterOperator::Lt,
        OperatorKind::Gt => FilterOperator::Gt,
        OperatorKind::Le => FilterOperator::Le,
        OperatorKind::Ge => FilterOperator::Ge,
        OperatorKind::Eq => FilterOperator::Eq,
        OperatorKind::Ne => FilterOperator::Ne,
        OperatorKind::Or => FilterOperator::Or,
        OperatorKind::And => FilterOperator::And,
        OperatorKind::Negate => FilterOperator::Neg,
        other => {
            return Err(EnumError::invalid_query_expression(format!(
                "operator '{}' is not supported",
                serde_json::to_string(&other).unwrap_or_default().trim_matches('"')
            )))
        }
    })
}

fn map_function(function: FunctionKind, name: &str) -> Result<FilterFunctionKind> {
    Ok(match function {
        FunctionKind::True => FilterFunctionKind::True,
        FunctionKind::False => FilterFunctionKind::False,
        FunctionKind::String => FilterFunctionKind::String,
        FunctionKind::Contains => FilterFunctionKind::Contains,
        FunctionKind::Not => FilterFunctionKind::Not,
        FunctionKind::Boolean => FilterFunctionKind::Boolean,
        FunctionKind::Like => FilterFunctionKind::Like,
        FunctionKind::In => FilterFunctionKind::In,
        FunctionKind::UserDefined => FilterFunctionKind::UserDefined,
        _ => {
            return Err(EnumError::invalid_query_expression(format!(
                "function '{name}' is not supported"
            )))
        }
    })
}

fn translate_constant(value: &Literal, return_type: ReturnType) -> Result<FilterNode> {
    let kind = match return_type {
        ReturnType::Number => ConstantKind::Number,
        ReturnType::String => ConstantKind::String,
        ReturnType::Boolean => ConstantKind::Boolean,
        ReturnType::NodeSet | ReturnType::Variable | ReturnType::Error => {
            return Err(EnumError::invalid_query_expression("constant of unsupported type"))
        }
    };
    let value = match value {
        Literal::Number(n) => super::format_number(*n),
        Literal::String(s) => s.clone(),
    };
    Ok(FilterNode::Constant { value, kind })
}

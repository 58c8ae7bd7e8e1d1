//! Parsed expression tree
//!
//! Every node reports a [`ReturnType`], which the parser uses for grammar-level
//! type checks (union operands, predicate inputs, function arguments).

use serde::Serialize;

pub use super::scanner::AxisKind;

/// Static result type of an expression node
///
/// `Error` doubles as "any": untyped extension functions report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnType {
    Number,
    String,
    Boolean,
    NodeSet,
    Variable,
    Error,
}

/// Node test attached to an axis step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTest {
    /// Name test (possibly empty for `*`)
    Name,
    Node,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeTest {
    /// Node-type test functions usable as a step
    #[must_use]
    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "node" => Some(Self::Node),
            "text" => Some(Self::Text),
            "comment" => Some(Self::Comment),
            "processing-instruction" => Some(Self::ProcessingInstruction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Negate,
    Union,
}

impl OperatorKind {
    #[must_use]
    pub const fn return_type(&self) -> ReturnType {
        match self {
            Self::Or
            | Self::And
            | Self::Eq
            | Self::Ne
            | Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge => ReturnType::Boolean,
            Self::Plus
            | Self::Minus
            | Self::Multiply
            | Self::Divide
            | Self::Modulo
            | Self::Negate => ReturnType::Number,
            Self::Union => ReturnType::NodeSet,
        }
    }
}

/// Built-in functions plus the catch-all extension function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionKind {
    Last,
    Position,
    Count,
    LocalName,
    NamespaceUri,
    Name,
    String,
    Boolean,
    Number,
    True,
    False,
    Not,
    Id,
    Concat,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    Substring,
    StringLength,
    NormalizeSpace,
    Translate,
    Lang,
    Sum,
    Floor,
    Ceiling,
    Round,
    Like,
    In,
    UserDefined,
}

impl FunctionKind {
    /// Look up a built-in by name (ASCII case-insensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const TABLE: &[(&str, FunctionKind)] = &[
            ("last", FunctionKind::Last),
            ("position", FunctionKind::Position),
            ("name", FunctionKind::Name),
            ("namespace-uri", FunctionKind::NamespaceUri),
            ("local-name", FunctionKind::LocalName),
            ("count", FunctionKind::Count),
            ("id", FunctionKind::Id),
            ("string", FunctionKind::String),
            ("concat", FunctionKind::Concat),
            ("starts-with", FunctionKind::StartsWith),
            ("contains", FunctionKind::Contains),
            ("substring-before", FunctionKind::SubstringBefore),
            ("substring-after", FunctionKind::SubstringAfter),
            ("substring", FunctionKind::Substring),
            ("string-length", FunctionKind::StringLength),
            ("normalize-space", FunctionKind::NormalizeSpace),
            ("translate", FunctionKind::Translate),
            ("boolean", FunctionKind::Boolean),
            ("not", FunctionKind::Not),
            ("true", FunctionKind::True),
            ("false", FunctionKind::False),
            ("lang", FunctionKind::Lang),
            ("number", FunctionKind::Number),
            ("sum", FunctionKind::Sum),
            ("floor", FunctionKind::Floor),
            ("ceiling", FunctionKind::Ceiling),
            ("round", FunctionKind::Round),
            ("like", FunctionKind::Like),
            ("in", FunctionKind::In),
        ];
        TABLE.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, kind)| *kind)
    }

    #[must_use]
    pub const fn return_type(&self) -> ReturnType {
        match self {
            Self::Last
            | Self::Position
            | Self::Count
            | Self::Number
            | Self::StringLength
            | Self::Sum
            | Self::Floor
            | Self::Ceiling
            | Self::Round => ReturnType::Number,
            Self::LocalName
            | Self::NamespaceUri
            | Self::Name
            | Self::String
            | Self::Concat
            | Self::SubstringBefore
            | Self::SubstringAfter
            | Self::Substring
            | Self::NormalizeSpace
            | Self::Translate => ReturnType::String,
            Self::Boolean
            | Self::True
            | Self::False
            | Self::Not
            | Self::StartsWith
            | Self::Contains
            | Self::Lang
            | Self::Like
            | Self::In => ReturnType::Boolean,
            Self::Id => ReturnType::NodeSet,
            Self::UserDefined => ReturnType::Error,
        }
    }
}

/// Literal value of a constant operand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Number(f64),
    String(String),
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum AstNode {
    Root,
    Axis {
        axis: AxisKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        input: Option<Box<AstNode>>,
        #[serde(skip_serializing_if = "String::is_empty")]
        prefix: String,
        #[serde(skip_serializing_if = "String::is_empty")]
        name: String,
        test: NodeTest,
    },
    Filter {
        input: Box<AstNode>,
        condition: Box<AstNode>,
    },
    Operator {
        op: OperatorKind,
        left: Box<AstNode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        right: Option<Box<AstNode>>,
    },
    Function {
        function: FunctionKind,
        #[serde(skip_serializing_if = "String::is_empty")]
        prefix: String,
        name: String,
        args: Vec<AstNode>,
    },
    Group {
        inner: Box<AstNode>,
    },
    Operand {
        value: Literal,
        return_type: ReturnType,
    },
    Variable {
        #[serde(skip_serializing_if = "String::is_empty")]
        prefix: String,
        name: String,
    },
}

impl AstNode {
    /// Static result type used for grammar checks
    #[must_use]
    pub fn return_type(&self) -> ReturnType {
        match self {
            Self::Root | Self::Axis { .. } | Self::Filter { .. } => ReturnType::NodeSet,
            Self::Operator { op, .. } => op.return_type(),
            Self::Function { function, .. } => function.return_type(),
            Self::Group { inner } => inner.return_type(),
            Self::Operand { return_type, .. } => *return_type,
            Self::Variable { .. } => ReturnType::Variable,
        }
    }

    /// Build an axis step
    pub fn axis(
        axis: AxisKind,
        input: Option<AstNode>,
        name: impl Into<String>,
        test: NodeTest,
    ) -> Self {
        Self::Axis {
            axis,
            input: input.map(Box::new),
            prefix: String::new(),
            name: name.into(),
            test,
        }
    }

    pub fn operator(op: OperatorKind, left: AstNode, right: Option<AstNode>) -> Self {
        Self::Operator {
            op,
            left: Box::new(left),
            right: right.map(Box::new),
        }
    }

    pub fn filter(input: AstNode, condition: AstNode) -> Self {
        Self::Filter {
            input: Box::new(input),
            condition: Box::new(condition),
        }
    }

    /// Built-in function call (name derived from the kind)
    pub fn builtin(function: FunctionKind, args: Vec<AstNode>) -> Self {
        let name = serde_json::to_value(function)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self::Function {
            function,
            prefix: String::new(),
            name,
            args,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Operand {
            value: Literal::String(value.into()),
            return_type: ReturnType::String,
        }
    }

    pub const fn number(value: f64) -> Self {
        Self::Operand {
            value: Literal::Number(value),
            return_type: ReturnType::Number,
        }
    }

    /// True for literal operands
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Operand { .. })
    }
}

//! Recursive-descent parser for urn expressions
//!
//! # Grammar (lowest precedence first)
//! ```text
//! Expr           := AndExpr ('or' Expr)?
//! AndExpr        := EqualityExpr ('and' AndExpr)?
//! EqualityExpr   := RelationalExpr (('=' | '!=') EqualityExpr)?
//! RelationalExpr := AdditiveExpr (('<' | '<=' | '>' | '>=') RelationalExpr)?
//! AdditiveExpr   := MultExpr (('+' | '-') AdditiveExpr)?
//! MultExpr       := UnaryExpr (('*' | 'div' | 'mod') MultExpr)?
//! UnaryExpr      := '-' UnaryExpr | UnionExpr
//! UnionExpr      := PathExpr ('|' UnionExpr)?
//! PathExpr       := FilterExpr (('/' | '//') RelativePath)? | LocationPath
//! FilterExpr     := PrimaryExpr Predicate*
//! PrimaryExpr    := String | Number | '(' Expr ')' | '$' Name | FunctionCall
//! LocationPath   := '/' RelativePath? | '//' RelativePath | RelativePath
//! RelativePath   := Step (('/' | '//') RelativePath)?
//! Step           := '.' | '..' | Basis Predicate*
//! Basis          := Name | '*' | '@' (Name | '*' | NodeType) | NodeType
//! ```
//!
//! Parsing is all-or-nothing: the first violation raises
//! [`EnumError::Syntax`] with the query text from the offending token.

use super::ast::{AstNode, AxisKind, FunctionKind, NodeTest, OperatorKind, ReturnType};
use super::scanner::{Scanner, Token};
use crate::error::{EnumError, Result, XPathErrorCode};
use crate::urn::unescape_string;

/// Arity and argument types of a built-in function
struct Signature {
    min: usize,
    max: usize,
    /// `ReturnType::Error` means any type is accepted
    arg_types: &'static [ReturnType],
}

const ANY: &[ReturnType] = &[ReturnType::Error];
const NODE_SET: &[ReturnType] = &[ReturnType::NodeSet];
const STRING: &[ReturnType] = &[ReturnType::String];
const STRING_2: &[ReturnType] = &[ReturnType::String, ReturnType::String];
const STRING_3: &[ReturnType] = &[ReturnType::String, ReturnType::String, ReturnType::String];
const SUBSTRING: &[ReturnType] = &[ReturnType::String, ReturnType::Number, ReturnType::Number];
const BOOLEAN: &[ReturnType] = &[ReturnType::Boolean];
const NUMBER: &[ReturnType] = &[ReturnType::Number];

const fn signature(kind: FunctionKind) -> Option<Signature> {
    let (min, max, arg_types) = match kind {
        FunctionKind::Last | FunctionKind::Position => (0, 0, ANY),
        FunctionKind::Name | FunctionKind::NamespaceUri | FunctionKind::LocalName => {
            (0, 1, NODE_SET)
        }
        FunctionKind::Count | FunctionKind::Sum => (1, 1, NODE_SET),
        FunctionKind::Number | FunctionKind::String => (0, 1, ANY),
        FunctionKind::Boolean | FunctionKind::Id => (1, 1, ANY),
        FunctionKind::Concat => (2, 100, STRING),
        FunctionKind::Lang => (1, 1, STRING),
        FunctionKind::StringLength | FunctionKind::NormalizeSpace => (0, 1, STRING),
        FunctionKind::StartsWith
        | FunctionKind::Contains
        | FunctionKind::Like
        | FunctionKind::In
        | FunctionKind::SubstringBefore
        | FunctionKind::SubstringAfter => (2, 2, STRING_2),
        FunctionKind::Substring => (2, 3, SUBSTRING),
        FunctionKind::Translate => (3, 3, STRING_3),
        FunctionKind::Not => (1, 1, BOOLEAN),
        FunctionKind::True | FunctionKind::False => (0, 0, BOOLEAN),
        FunctionKind::Floor | FunctionKind::Ceiling | FunctionKind::Round => (1, 1, NUMBER),
        FunctionKind::UserDefined => return None,
    };
    Some(Signature {
        min,
        max,
        arg_types,
    })
}

/// Parse an expression string into an AST
pub fn parse(query: &str) -> Result<AstNode> {
    Parser::new(query).run()
}

/// Parser state over one scanner
pub struct Parser {
    scanner: Scanner,
}

impl Parser {
    pub fn new(query: &str) -> Self {
        Self {
            scanner: Scanner::new(query),
        }
    }

    /// Parse the whole input; trailing tokens are an error
    pub fn run(mut self) -> Result<AstNode> {
        if self.advance()? == Token::Eof {
            return Err(self.error(XPathErrorCode::TokenExpected));
        }
        let result = self.parse_expr()?;
        if self.token() != Token::Eof {
            return Err(self.error(XPathErrorCode::InvalidToken));
        }
        Ok(result)
    }

    fn token(&self) -> Token {
        self.scanner.token()
    }

    fn advance(&mut self) -> Result<Token> {
        self.scanner.next_token()
    }

    fn error(&self, code: XPathErrorCode) -> EnumError {
        EnumError::syntax(code, self.scanner.remaining())
    }

    fn expect(&self, token: Token) -> Result<()> {
        if self.token() == token {
            Ok(())
        } else {
            Err(self.error(XPathErrorCode::InvalidToken))
        }
    }

    /// Unprefixed keyword such as `and`, `or`, `div`
    fn at_keyword(&self, keyword: &str) -> bool {
        self.token() == Token::Name
            && self.scanner.prefix().is_empty()
            && self.scanner.name() == keyword
    }

    fn parse_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_and_expr()?;
        if self.at_keyword("or") {
            self.advance()?;
            let right = self.parse_expr()?;
            return Ok(AstNode::operator(OperatorKind::Or, left, Some(right)));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_equality_expr()?;
        if self.at_keyword("and") {
            self.advance()?;
            let right = self.parse_and_expr()?;
            return Ok(AstNode::operator(OperatorKind::And, left, Some(right)));
        }
        Ok(left)
    }

    fn parse_equality_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_relational_expr()?;
        let op = match self.token() {
            Token::Eq => OperatorKind::Eq,
            Token::Ne => OperatorKind::Ne,
            _ => return Ok(left),
        };
        self.advance()?;
        if self.token() == Token::Eof {
            return Err(self.error(XPathErrorCode::ExpressionExpected));
        }
        let right = self.parse_equality_expr()?;
        Ok(AstNode::operator(op, left, Some(right)))
    }

    fn parse_relational_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_additive_expr()?;
        let op = match self.token() {
            Token::Lt => OperatorKind::Lt,
            Token::Le => OperatorKind::Le,
            Token::Gt => OperatorKind::Gt,
            Token::Ge => OperatorKind::Ge,
            _ => return Ok(left),
        };
        self.advance()?;
        if self.token() == Token::Eof {
            return Err(self.error(XPathErrorCode::ExpressionExpected));
        }
        let right = self.parse_relational_expr()?;
        Ok(AstNode::operator(op, left, Some(right)))
    }

    fn parse_additive_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_multiplicative_expr()?;
        let op = match self.token() {
            Token::Plus => OperatorKind::Plus,
            Token::Minus => OperatorKind::Minus,
            _ => return Ok(left),
        };
        self.advance()?;
        if self.token() == Token::Eof {
            return Err(self.error(XPathErrorCode::NumberExpected));
        }
        let right = self.parse_additive_expr()?;
        Ok(AstNode::operator(op, left, Some(right)))
    }

    fn parse_multiplicative_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_unary_expr()?;
        let op = if self.token() == Token::Star {
            OperatorKind::Multiply
        } else if self.at_keyword("div") {
            OperatorKind::Divide
        } else if self.at_keyword("mod") {
            OperatorKind::Modulo
        } else {
            return Ok(left);
        };
        self.advance()?;
        if self.token() == Token::Eof {
            return Err(self.error(XPathErrorCode::NumberExpected));
        }
        let right = self.parse_multiplicative_expr()?;
        Ok(AstNode::operator(op, left, Some(right)))
    }

    fn parse_unary_expr(&mut self) -> Result<AstNode> {
        if self.token() == Token::Minus {
            self.advance()?;
            if self.token() == Token::Eof {
                return Err(self.error(XPathErrorCode::NumberExpected));
            }
            let operand = self.parse_unary_expr()?;
            return Ok(AstNode::operator(OperatorKind::Negate, operand, None));
        }
        self.parse_union_expr()
    }

    fn parse_union_expr(&mut self) -> Result<AstNode> {
        let left = self.parse_path_expr()?;
        if self.token() != Token::Union {
            return Ok(left);
        }
        if left.return_type() != ReturnType::NodeSet {
            return Err(self.error(XPathErrorCode::InvalidToken));
        }
        self.advance()?;
        if self.token() == Token::Eof {
            return Err(self.error(XPathErrorCode::TokenExpected));
        }
        let right = self.parse_union_expr()?;
        if right.return_type() != ReturnType::NodeSet {
            return Err(self.error(XPathErrorCode::InvalidToken));
        }
        Ok(AstNode::operator(OperatorKind::Union, left, Some(right)))
    }

    fn is_node_type(&self) -> bool {
        NodeTest::from_function_name(self.scanner.name()).is_some()
    }

    fn parse_path_expr(&mut self) -> Result<AstNode> {
        let starts_filter_expr = match self.token() {
            Token::Function => !self.is_node_type(),
            Token::Dollar | Token::LParens | Token::Number | Token::String => true,
            _ => false,
        };
        if !starts_filter_expr {
            return self.parse_location_path(None);
        }

        let expr = self.parse_filter_expr()?;
        match self.token() {
            Token::Slash => {
                self.advance()?;
                self.parse_relative_path(Some(expr))
            }
            Token::SlashSlash => {
                let descendants =
                    AstNode::axis(AxisKind::DescendantOrSelf, Some(expr), "", NodeTest::Node);
                self.advance()?;
                self.parse_relative_path(Some(descendants))
            }
            _ => Ok(expr),
        }
    }

    fn parse_location_path(&mut self, input: Option<AstNode>) -> Result<AstNode> {
        match self.token() {
            Token::Slash => {
                self.advance()?;
                if self.token() == Token::Eof {
                    return Ok(AstNode::Root);
                }
                self.parse_relative_path(Some(AstNode::Root))
            }
            Token::SlashSlash => {
                let descendants = AstNode::axis(
                    AxisKind::DescendantOrSelf,
                    Some(AstNode::Root),
                    "",
                    NodeTest::Node,
                );
                self.advance()?;
                if matches!(self.token(), Token::Eof | Token::Union) {
                    return Err(self.error(XPathErrorCode::TokenExpected));
                }
                self.parse_relative_path(Some(descendants))
            }
            _ => self.parse_relative_path(input),
        }
    }

    fn parse_relative_path(&mut self, input: Option<AstNode>) -> Result<AstNode> {
        let mut step = self.parse_step(input)?;
        if self.token() == Token::SlashSlash {
            self.advance()?;
            let descendants =
                AstNode::axis(AxisKind::DescendantOrSelf, Some(step), "", NodeTest::Node);
            step = self.parse_relative_path(Some(descendants))?;
        }
        if self.token() == Token::Slash {
            self.advance()?;
            if self.token() == Token::Eof {
                return Err(self.error(XPathErrorCode::QueryExpected));
            }
            step = self.parse_relative_path(Some(step))?;
        }
        Ok(step)
    }

    fn parse_step(&mut self, input: Option<AstNode>) -> Result<AstNode> {
        match self.token() {
            Token::Dot => {
                self.advance()?;
                return Ok(AstNode::axis(AxisKind::SelfAxis, input, "", NodeTest::Node));
            }
            Token::DotDot => {
                self.advance()?;
                return Ok(AstNode::axis(AxisKind::Parent, input, "", NodeTest::Node));
            }
            _ => {}
        }

        let mut step = self.parse_basis(input)?;
        while self.token() == Token::LBracket {
            let condition = self.parse_predicate()?;
            if step.return_type() != ReturnType::NodeSet {
                return Err(self.error(XPathErrorCode::NodeSetExpected));
            }
            step = AstNode::filter(step, condition);
        }
        Ok(step)
    }

    fn parse_basis(&mut self, input: Option<AstNode>) -> Result<AstNode> {
        match self.token() {
            Token::Function => {
                let (test, name) = self.parse_node_type()?;
                self.advance()?;
                Ok(AstNode::axis(AxisKind::Child, input, name, test))
            }
            Token::Name => {
                let node = AstNode::Axis {
                    axis: AxisKind::Child,
                    input: input.map(Box::new),
                    prefix: self.scanner.prefix().to_string(),
                    name: self.scanner.name().to_string(),
                    test: NodeTest::Name,
                };
                self.advance()?;
                Ok(node)
            }
            Token::At => {
                self.advance()?;
                let node = match self.token() {
                    Token::Function => {
                        let (test, name) = self.parse_node_type()?;
                        AstNode::axis(AxisKind::Attribute, input, name, test)
                    }
                    Token::Name => AstNode::Axis {
                        axis: AxisKind::Attribute,
                        input: input.map(Box::new),
                        prefix: self.scanner.prefix().to_string(),
                        name: self.scanner.name().to_string(),
                        test: NodeTest::Name,
                    },
                    Token::Star => AstNode::axis(AxisKind::Attribute, input, "", NodeTest::Name),
                    _ => return Err(self.error(XPathErrorCode::NodeTestExpected)),
                };
                self.advance()?;
                Ok(node)
            }
            Token::Star => {
                self.advance()?;
                Ok(AstNode::axis(AxisKind::Child, input, "", NodeTest::Name))
            }
            // explicit axes are not part of the urn dialect
            _ => Err(self.error(XPathErrorCode::InvalidToken)),
        }
    }

    /// `node()`, `text()`, `comment()`, `processing-instruction('target'?)`; leaves `)` current
    fn parse_node_type(&mut self) -> Result<(NodeTest, String)> {
        if !self.scanner.prefix().is_empty() {
            return Err(self.error(XPathErrorCode::NodeTestExpected));
        }
        let Some(test) = NodeTest::from_function_name(self.scanner.name()) else {
            return Err(self.error(XPathErrorCode::NodeTestExpected));
        };
        self.advance()?;
        self.expect(Token::LParens)?;
        let mut name = String::new();
        if test == NodeTest::ProcessingInstruction && self.scanner.lookahead() != ')' {
            self.advance()?;
            self.expect(Token::String)?;
            name = unescape_string(self.scanner.string_value());
        }
        self.advance()?;
        self.expect(Token::RParens)?;
        Ok((test, name))
    }

    fn parse_predicate(&mut self) -> Result<AstNode> {
        self.expect(Token::LBracket)?;
        self.advance()?;
        let condition = self.parse_expr()?;
        self.expect(Token::RBracket)?;
        self.advance()?;
        Ok(condition)
    }

    fn parse_filter_expr(&mut self) -> Result<AstNode> {
        let mut expr = self.parse_primary_expr()?;
        while self.token() == Token::LBracket {
            let condition = self.parse_predicate()?;
            if expr.return_type() != ReturnType::NodeSet {
                return Err(self.error(XPathErrorCode::NodeSetExpected));
            }
            expr = AstNode::filter(expr, condition);
        }
        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<AstNode> {
        let node = match self.token() {
            Token::String => AstNode::string(unescape_string(self.scanner.string_value())),
            Token::Number => AstNode::number(self.scanner.number()),
            Token::LParens => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect(Token::RParens)?;
                if inner.is_constant() {
                    inner
                } else {
                    AstNode::Group {
                        inner: Box::new(inner),
                    }
                }
            }
            Token::Dollar => {
                self.advance()?;
                self.expect(Token::Name)?;
                AstNode::Variable {
                    prefix: self.scanner.prefix().to_string(),
                    name: self.scanner.name().to_string(),
                }
            }
            _ => self.parse_method()?,
        };
        self.advance()?;
        Ok(node)
    }

    /// Function call; leaves `)` as the current token
    fn parse_method(&mut self) -> Result<AstNode> {
        if self.token() != Token::Function || self.scanner.lookahead() != '(' {
            return Err(self.error(XPathErrorCode::FunctionExpected));
        }

        let builtin = if self.scanner.prefix().is_empty() {
            FunctionKind::from_name(self.scanner.name())
                .and_then(|kind| signature(kind).map(|s| (kind, s)))
        } else {
            None
        };
        let Some((kind, signature)) = builtin else {
            return self.parse_extension_method();
        };

        // skip name and '('
        self.advance()?;
        self.advance()?;

        let check_max = kind != FunctionKind::Concat;
        let mut args = Vec::new();
        while self.token() != Token::RParens {
            if check_max && args.len() == signature.max {
                return Err(self.error(XPathErrorCode::InvalidNumArgs));
            }
            let type_index = if check_max { args.len() } else { 0 };
            let mut arg = self.parse_expr()?;
            let expected = signature
                .arg_types
                .get(type_index)
                .copied()
                .unwrap_or(ReturnType::Error);
            if expected != ReturnType::Error && arg.return_type() != expected {
                arg = match expected {
                    ReturnType::NodeSet => {
                        let untyped_function = matches!(arg, AstNode::Function { .. })
                            && arg.return_type() == ReturnType::Error;
                        if arg.return_type() != ReturnType::Variable && !untyped_function {
                            return Err(self.error(XPathErrorCode::InvalidArgument));
                        }
                        arg
                    }
                    ReturnType::String => AstNode::builtin(FunctionKind::String, vec![arg]),
                    ReturnType::Number => AstNode::builtin(FunctionKind::Number, vec![arg]),
                    ReturnType::Boolean => AstNode::builtin(FunctionKind::Boolean, vec![arg]),
                    ReturnType::Variable | ReturnType::Error => arg,
                };
            }
            args.push(arg);
            self.parse_argument_separator()?;
        }

        if args.len() < signature.min {
            return Err(self.error(XPathErrorCode::InvalidNumArgs));
        }
        Ok(AstNode::builtin(kind, args))
    }

    fn parse_extension_method(&mut self) -> Result<AstNode> {
        let prefix = self.scanner.prefix().to_string();
        let name = self.scanner.name().to_string();
        self.advance()?;
        self.advance()?;

        let mut args = Vec::new();
        while self.token() != Token::RParens {
            args.push(self.parse_expr()?);
            self.parse_argument_separator()?;
        }
        Ok(AstNode::Function {
            function: FunctionKind::UserDefined,
            prefix,
            name,
            args,
        })
    }

    /// After an argument: `,` followed by another argument, or the closing `)`
    fn parse_argument_separator(&mut self) -> Result<()> {
        match self.token() {
            Token::Comma => {
                self.advance()?;
                if self.token() == Token::RParens {
                    return Err(self.error(XPathErrorCode::ExpressionExpected));
                }
                Ok(())
            }
            Token::RParens => Ok(()),
            _ => Err(self.error(XPathErrorCode::InvalidToken)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xpath::ast::Literal;
    use pretty_assertions::assert_eq;

    fn attr(name: &str) -> AstNode {
        AstNode::axis(AxisKind::Attribute, None, name, NodeTest::Name)
    }

    fn code_of(query: &str) -> XPathErrorCode {
        parse(query).unwrap_err().syntax_code().unwrap()
    }

    #[test]
    fn test_parse_simple_filter() {
        let ast = parse("Table[@IsSystemObject=False()]").unwrap();
        let expected = AstNode::filter(
            AstNode::axis(AxisKind::Child, None, "Table", NodeTest::Name),
            AstNode::operator(
                OperatorKind::Eq,
                attr("IsSystemObject"),
                Some(AstNode::builtin(FunctionKind::False, vec![])),
            ),
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_parse_path_steps_chain_inputs() {
        let ast = parse("Server/Database").unwrap();
        let expected = AstNode::axis(
            AxisKind::Child,
            Some(AstNode::axis(AxisKind::Child, None, "Server", NodeTest::Name)),
            "Database",
            NodeTest::Name,
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_parse_rooted_path() {
        match parse("/Server").unwrap() {
            AstNode::Axis {
                input: Some(input),
                name,
                ..
            } => {
                assert_eq!(*input, AstNode::Root);
                assert_eq!(name, "Server");
            }
            other => panic!("unexpected node {other:?}"),
        }
        assert_eq!(parse("/").unwrap(), AstNode::Root);
    }

    #[test]
    fn test_operator_precedence() {
        let ast = parse("@A=1 or @B=2 and @C=3").unwrap();
        match ast {
            AstNode::Operator {
                op: OperatorKind::Or,
                right: Some(right),
                ..
            } => {
                assert!(matches!(
                    *right,
                    AstNode::Operator {
                        op: OperatorKind::And,
                        ..
                    }
                ));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_string_literal_is_unescaped() {
        let ast = parse("@Name='O''Brien'").unwrap();
        match ast {
            AstNode::Operator {
                right: Some(right),
                ..
            } => match *right {
                AstNode::Operand {
                    value: Literal::String(s),
                    ..
                } => assert_eq!(s, "O'Brien"),
                other => panic!("unexpected operand {other:?}"),
            },
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_contains_wraps_attribute_in_string() {
        let ast = parse("contains(@Name, 'it')").unwrap();
        let expected = AstNode::builtin(
            FunctionKind::Contains,
            vec![
                AstNode::builtin(FunctionKind::String, vec![attr("Name")]),
                AstNode::string("it"),
            ],
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_not_wraps_argument_in_boolean() {
        let ast = parse("not(@IsSystemObject)").unwrap();
        let expected = AstNode::builtin(
            FunctionKind::Not,
            vec![AstNode::builtin(FunctionKind::Boolean, vec![attr("IsSystemObject")])],
        );
        assert_eq!(ast, expected);
    }

    #[test]
    fn test_concat_accepts_many_arguments() {
        let ast = parse("concat('a', 'b', 'c', 'd')").unwrap();
        match ast {
            AstNode::Function {
                function: FunctionKind::Concat,
                args,
                ..
            } => assert_eq!(args.len(), 4),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_extension_function() {
        let ast = parse("BitWiseAnd(@Flags, 4)").unwrap();
        match ast {
            AstNode::Function {
                function: FunctionKind::UserDefined,
                name,
                args,
                ..
            } => {
                assert_eq!(name, "BitWiseAnd");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_parenthesised_constant_is_not_grouped() {
        assert_eq!(parse("(1)").unwrap(), AstNode::number(1.0));
        assert!(matches!(parse("(@A=1)").unwrap(), AstNode::Group { .. }));
    }

    #[test]
    fn test_union_requires_node_sets() {
        assert!(parse("a|b").is_ok());
        assert_eq!(code_of("1|b"), XPathErrorCode::InvalidToken);
        assert_eq!(code_of("a|'x'"), XPathErrorCode::InvalidToken);
        assert_eq!(code_of("a|"), XPathErrorCode::TokenExpected);
    }

    #[test]
    fn test_argument_count_errors() {
        assert_eq!(code_of("count()"), XPathErrorCode::InvalidNumArgs);
        assert_eq!(code_of("true(1)"), XPathErrorCode::InvalidNumArgs);
        assert_eq!(
            code_of("contains(@a,'b',)"),
            XPathErrorCode::ExpressionExpected
        );
    }

    #[test]
    fn test_node_set_argument_error() {
        assert_eq!(code_of("count('x')"), XPathErrorCode::InvalidArgument);
        assert!(parse("count($v)").is_ok());
    }

    #[test]
    fn test_predicate_on_constant_requires_node_set() {
        assert_eq!(code_of("'x'[1]"), XPathErrorCode::NodeSetExpected);
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(code_of(""), XPathErrorCode::TokenExpected);
        assert_eq!(code_of("a]"), XPathErrorCode::InvalidToken);
        assert_eq!(code_of("a/"), XPathErrorCode::QueryExpected);
        assert_eq!(code_of("//"), XPathErrorCode::TokenExpected);
        assert_eq!(code_of("@1"), XPathErrorCode::NodeTestExpected);
        assert_eq!(code_of("a[@b="), XPathErrorCode::ExpressionExpected);
        assert_eq!(code_of("1 +"), XPathErrorCode::NumberExpected);
        assert_eq!(code_of("child::a"), XPathErrorCode::InvalidToken);
    }

    #[test]
    fn test_node_type_steps() {
        match parse("a/text()").unwrap() {
            AstNode::Axis { test, .. } => assert_eq!(test, NodeTest::Text),
            other => panic!("unexpected node {other:?}"),
        }
        match parse("processing-instruction('pi')").unwrap() {
            AstNode::Axis { test, name, .. } => {
                assert_eq!(test, NodeTest::ProcessingInstruction);
                assert_eq!(name, "pi");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        assert_eq!(
            parse("a[@x = 'y' and @z=1]").unwrap(),
            parse("a[ @x='y'   and @z = 1 ]").unwrap()
        );
    }
}

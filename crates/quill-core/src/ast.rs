//! Syntax tree handed to the evaluator.
//!
//! The parser that produces these nodes lives outside this workspace; the
//! types here are the contract between the two. Constructors such as
//! [`Expression::int`] or [`Statement::declare`] build nodes with an
//! unknown span, which is what embedders and tests use.
//!
//! ## Shape
//!
//! ```text
//! ScriptNode
//! └── TopLevelNode
//!     ├── Namespace ── NamespaceMember (Method | Field)
//!     ├── Method   (outside any namespace)
//!     └── Statement (ignored with a warning)
//! ```
//!
//! Two fields are filled in by resolution rather than by the parser:
//! [`IdentifierNode::local`] and [`MethodCall::resolved`].

use std::fmt;

use ordered_float::OrderedFloat;

use crate::{Identifier, MethodId, PrimitiveType, ScriptId, Span};

// ============================================================================
// Top level
// ============================================================================

/// The parsed contents of one script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptNode {
    pub script: ScriptId,
    pub body: Vec<TopLevelNode>,
}

impl ScriptNode {
    pub fn new(script: ScriptId, body: Vec<TopLevelNode>) -> Self {
        Self { script, body }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelNode {
    Namespace(NamespaceNode),
    Method(MethodDeclarationNode),
    Statement(Statement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceNode {
    pub name: Identifier,
    pub body: Vec<NamespaceMember>,
    pub span: Span,
}

impl NamespaceNode {
    pub fn new(name: impl Into<Identifier>, body: Vec<NamespaceMember>) -> Self {
        Self {
            name: name.into(),
            body,
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceMember {
    Method(MethodDeclarationNode),
    Field(FieldDeclarationNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclarationNode {
    pub name: String,
    pub ty: PrimitiveType,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub ty: PrimitiveType,
    pub span: Span,
}

impl ParameterNode {
    pub fn new(name: impl Into<String>, ty: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            ty,
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDeclarationNode {
    pub return_type: PrimitiveType,
    pub name: Identifier,
    pub parameters: Vec<ParameterNode>,
    pub body: Vec<Statement>,
    pub span: Span,
}

impl MethodDeclarationNode {
    pub fn new(
        return_type: PrimitiveType,
        name: impl Into<Identifier>,
        parameters: Vec<ParameterNode>,
        body: Vec<Statement>,
    ) -> Self {
        Self {
            return_type,
            name: name.into(),
            parameters,
            body,
            span: Span::default(),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    VariableDeclaration(VariableDeclaration),
    Return(ReturnStatement),
    If(IfStatement),
    Block(BlockStatement),
    /// Inline target assembly. Carried through the tree but never lowered.
    Assembly(AssemblyBlock),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: PrimitiveType,
    pub initializer: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub value: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<ElseBranch>>,
    pub span: Span,
}

/// An `elif` (with a condition) or a final `else` (without one).
#[derive(Debug, Clone, PartialEq)]
pub struct ElseBranch {
    pub condition: Option<Expression>,
    pub body: Box<Statement>,
    pub next: Option<Box<ElseBranch>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyBlock {
    pub text: String,
    pub span: Span,
}

impl Statement {
    pub fn expr(expression: Expression) -> Self {
        Statement::Expression(expression)
    }

    pub fn declare(name: impl Into<String>, ty: PrimitiveType, initializer: Option<Expression>) -> Self {
        Statement::VariableDeclaration(VariableDeclaration {
            name: name.into(),
            ty,
            initializer,
            span: Span::default(),
        })
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Statement::Return(ReturnStatement {
            value,
            span: Span::default(),
        })
    }

    pub fn if_(condition: Expression, then_branch: Statement, else_branch: Option<ElseBranch>) -> Self {
        Statement::If(IfStatement {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
            span: Span::default(),
        })
    }

    pub fn block(statements: Vec<Statement>) -> Self {
        Statement::Block(BlockStatement {
            statements,
            span: Span::default(),
        })
    }

    pub fn asm(text: impl Into<String>) -> Self {
        Statement::Assembly(AssemblyBlock {
            text: text.into(),
            span: Span::default(),
        })
    }

    pub fn span(&self) -> Span {
        match self {
            Statement::Expression(e) => e.span(),
            Statement::VariableDeclaration(d) => d.span,
            Statement::Return(r) => r.span,
            Statement::If(i) => i.span,
            Statement::Block(b) => b.span,
            Statement::Assembly(a) => a.span,
        }
    }
}

impl ElseBranch {
    pub fn elif(condition: Expression, body: Statement, next: Option<ElseBranch>) -> Self {
        Self {
            condition: Some(condition),
            body: Box::new(body),
            next: next.map(Box::new),
            span: Span::default(),
        }
    }

    pub fn otherwise(body: Statement) -> Self {
        Self {
            condition: None,
            body: Box::new(body),
            next: None,
            span: Span::default(),
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Numeric(i128),
    Floating(OrderedFloat<f64>),
    String(String),
    Boolean(bool),
    Null,
}

impl Literal {
    /// Type of the literal before any context narrows it.
    pub fn ty(&self) -> PrimitiveType {
        match self {
            Literal::Numeric(_) => PrimitiveType::GenericNumber,
            Literal::Floating(_) => PrimitiveType::GenericFloating,
            Literal::String(_) => PrimitiveType::Str,
            Literal::Boolean(_) => PrimitiveType::Bool,
            Literal::Null => PrimitiveType::Ptr,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Numeric(v) => write!(f, "{v}"),
            Literal::Floating(v) => write!(f, "{v:?}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

/// Storage a resolved identifier refers to.
///
/// Parameters use negative indices (`-(i + 1)` for parameter `i`), locals
/// count up from zero in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalRef {
    pub ty: PrimitiveType,
    pub index: i32,
}

impl LocalRef {
    pub fn parameter(position: usize, ty: PrimitiveType) -> Self {
        Self {
            ty,
            index: -(position as i32 + 1),
        }
    }

    pub fn local(index: i32, ty: PrimitiveType) -> Self {
        Self { ty, index }
    }

    pub fn is_parameter(&self) -> bool {
        self.index < 0
    }

    /// Position in the parameter list, for parameter references.
    pub fn parameter_position(&self) -> Option<usize> {
        self.is_parameter().then(|| (-self.index - 1) as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Equal,
    NotEqual,
}

impl BinaryOperator {
    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison()
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOperator::Equal | BinaryOperator::NotEqual)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(LiteralExpression),
    Identifier(IdentifierNode),
    Binary(BinaryExpression),
    Assignment(AssignmentExpression),
    Call(MethodCall),
    Cast(TypeCast),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpression {
    pub value: Literal,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierNode {
    pub symbol: Identifier,
    pub local: Option<LocalRef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub assignee: IdentifierNode,
    pub value: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub target: Identifier,
    pub arguments: Vec<Expression>,
    pub resolved: Option<MethodId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeCast {
    pub expression: Box<Expression>,
    pub target: PrimitiveType,
    pub span: Span,
}

impl Expression {
    pub fn literal(value: Literal) -> Self {
        Expression::Literal(LiteralExpression {
            value,
            span: Span::default(),
        })
    }

    pub fn int(value: i128) -> Self {
        Self::literal(Literal::Numeric(value))
    }

    pub fn float(value: f64) -> Self {
        Self::literal(Literal::Floating(OrderedFloat(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(Literal::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(Literal::Boolean(value))
    }

    pub fn null() -> Self {
        Self::literal(Literal::Null)
    }

    pub fn ident(name: impl Into<Identifier>) -> Self {
        Expression::Identifier(IdentifierNode::new(name))
    }

    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary(BinaryExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        })
    }

    pub fn assign(name: impl Into<Identifier>, value: Expression) -> Self {
        Expression::Assignment(AssignmentExpression {
            assignee: IdentifierNode::new(name),
            value: Box::new(value),
            span: Span::default(),
        })
    }

    pub fn call(target: impl Into<Identifier>, arguments: Vec<Expression>) -> Self {
        Expression::Call(MethodCall {
            target: target.into(),
            arguments,
            resolved: None,
            span: Span::default(),
        })
    }

    pub fn cast(expression: Expression, target: PrimitiveType) -> Self {
        let span = expression.span();
        Expression::Cast(TypeCast {
            expression: Box::new(expression),
            target,
            span,
        })
    }

    /// The value a declaration without initializer starts with.
    ///
    /// Returns `None` for types that cannot hold a value.
    pub fn default_for(ty: PrimitiveType) -> Option<Expression> {
        let value = match ty {
            PrimitiveType::Void | PrimitiveType::GenericNumber | PrimitiveType::GenericFloating => {
                return None;
            }
            PrimitiveType::F32 | PrimitiveType::F64 => Expression::float(0.0),
            PrimitiveType::Bool => Expression::boolean(false),
            PrimitiveType::Str => Expression::string(""),
            PrimitiveType::Ptr => Expression::null(),
            PrimitiveType::Char => Expression::cast(Expression::int(0), PrimitiveType::Char),
            _ => Expression::int(0),
        };
        Some(value)
    }

    pub fn span(&self) -> Span {
        match self {
            Expression::Literal(l) => l.span,
            Expression::Identifier(i) => i.span,
            Expression::Binary(b) => b.span,
            Expression::Assignment(a) => a.span,
            Expression::Call(c) => c.span,
            Expression::Cast(c) => c.span,
        }
    }

    /// The integer value, if this is an integer literal.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Expression::Literal(LiteralExpression {
                value: Literal::Numeric(v),
                ..
            }) => Some(*v),
            _ => None,
        }
    }
}

impl IdentifierNode {
    pub fn new(symbol: impl Into<Identifier>) -> Self {
        Self {
            symbol: symbol.into(),
            local: None,
            span: Span::default(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(l) => write!(f, "{}", l.value),
            Expression::Identifier(i) => match i.local {
                Some(local) => write!(f, "{}@{}", i.symbol, local.index),
                None => write!(f, "{}", i.symbol),
            },
            Expression::Binary(b) => write!(f, "({} {} {})", b.left, b.operator.symbol(), b.right),
            Expression::Assignment(a) => write!(f, "{} = {}", Expression::Identifier(a.assignee.clone()), a.value),
            Expression::Call(c) => {
                write!(f, "{}(", c.target)?;
                for (i, arg) in c.arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expression::Cast(c) => write!(f, "({}){}", c.target, c.expression),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Expression(e) => write!(f, "{e};"),
            Statement::VariableDeclaration(d) => match &d.initializer {
                Some(init) => write!(f, "{} {} = {init};", d.ty, d.name),
                None => write!(f, "{} {};", d.ty, d.name),
            },
            Statement::Return(r) => match &r.value {
                Some(v) => write!(f, "return {v};"),
                None => f.write_str("return;"),
            },
            Statement::If(i) => {
                write!(f, "if {} {}", i.condition, i.then_branch)?;
                let mut branch = i.else_branch.as_deref();
                while let Some(b) = branch {
                    match &b.condition {
                        Some(c) => write!(f, " elif {c} {}", b.body)?,
                        None => write!(f, " else {}", b.body)?,
                    }
                    branch = b.next.as_deref();
                }
                Ok(())
            }
            Statement::Block(b) => {
                f.write_str("{ ")?;
                for s in &b.statements {
                    write!(f, "{s} ")?;
                }
                f.write_str("}")
            }
            Statement::Assembly(_) => f.write_str("asm { ... }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_types_are_generic_until_used() {
        assert_eq!(Literal::Numeric(5).ty(), PrimitiveType::GenericNumber);
        assert_eq!(Literal::Floating(OrderedFloat(1.5)).ty(), PrimitiveType::GenericFloating);
        assert_eq!(Literal::String("hi".into()).ty(), PrimitiveType::Str);
        assert_eq!(Literal::Null.ty(), PrimitiveType::Ptr);
    }

    #[test]
    fn parameters_map_to_negative_indices() {
        let first = LocalRef::parameter(0, PrimitiveType::I32);
        let third = LocalRef::parameter(2, PrimitiveType::I32);
        assert_eq!(first.index, -1);
        assert_eq!(third.index, -3);
        assert_eq!(third.parameter_position(), Some(2));
        assert_eq!(LocalRef::local(0, PrimitiveType::I32).parameter_position(), None);
    }

    #[test]
    fn defaults_exist_for_value_types_only() {
        assert_eq!(Expression::default_for(PrimitiveType::U8), Some(Expression::int(0)));
        assert_eq!(Expression::default_for(PrimitiveType::Bool), Some(Expression::boolean(false)));
        assert!(Expression::default_for(PrimitiveType::Void).is_none());
        assert!(matches!(
            Expression::default_for(PrimitiveType::Char),
            Some(Expression::Cast(TypeCast {
                target: PrimitiveType::Char,
                ..
            }))
        ));
    }

    #[test]
    fn display_is_compact() {
        let stmt = Statement::declare(
            "x",
            PrimitiveType::I32,
            Some(Expression::binary(
                BinaryOperator::Add,
                Expression::int(1),
                Expression::call("Std.Math.Abs", vec![Expression::ident("y")]),
            )),
        );
        assert_eq!(stmt.to_string(), "i32 x = (1 + Std.Math.Abs(y));");
    }
}

//! Static types of resolved expressions.

use quill_core::ast::Expression;
use quill_core::{EvaluationError, PrimitiveType};

use crate::conversion::common_type;
use crate::program::CompilationRoot;

/// Type an expression evaluates to.
///
/// Identifiers and calls must already be resolved; an unresolved one is
/// reported as not found.
pub fn expression_type(root: &CompilationRoot, expr: &Expression) -> Result<PrimitiveType, EvaluationError> {
    match expr {
        Expression::Literal(l) => Ok(l.value.ty()),
        Expression::Identifier(node) => node.local.map(|l| l.ty).ok_or_else(|| {
            EvaluationError::LocalVariableNotFound {
                name: node.symbol.to_string(),
                span: node.span,
            }
        }),
        Expression::Binary(b) => {
            let left = expression_type(root, &b.left)?;
            let right = expression_type(root, &b.right)?;
            let common = common_type(left, right, b.span)?;
            if b.operator.is_comparison() {
                return Ok(PrimitiveType::Bool);
            }
            if !common.is_numeric() {
                return Err(EvaluationError::InstructionNotImplemented {
                    construct: format!("'{}' on '{common}'", b.operator.symbol()),
                    span: b.span,
                });
            }
            Ok(common)
        }
        Expression::Assignment(a) => a.assignee.local.map(|l| l.ty).ok_or_else(|| {
            EvaluationError::LocalVariableNotFound {
                name: a.assignee.symbol.to_string(),
                span: a.assignee.span,
            }
        }),
        Expression::Call(c) => c
            .resolved
            .map(|id| root.method(id).return_type)
            .ok_or_else(|| EvaluationError::MethodNotFound {
                name: c.target.to_string(),
                span: c.span,
            }),
        Expression::Cast(c) => Ok(c.target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ast::{BinaryOperator, IdentifierNode, LocalRef};

    fn local(name: &str, index: i32, ty: PrimitiveType) -> Expression {
        let mut node = IdentifierNode::new(name);
        node.local = Some(LocalRef::local(index, ty));
        Expression::Identifier(node)
    }

    #[test]
    fn binary_takes_common_type() {
        let root = CompilationRoot::new();
        let expr = Expression::binary(BinaryOperator::Add, local("x", 0, PrimitiveType::U8), Expression::int(1));
        assert_eq!(expression_type(&root, &expr), Ok(PrimitiveType::U8));
    }

    #[test]
    fn comparison_is_bool() {
        let root = CompilationRoot::new();
        let expr = Expression::binary(BinaryOperator::Equal, local("x", 0, PrimitiveType::I64), Expression::int(1));
        assert_eq!(expression_type(&root, &expr), Ok(PrimitiveType::Bool));
    }

    #[test]
    fn arithmetic_on_strings_is_rejected() {
        let root = CompilationRoot::new();
        let expr = Expression::binary(BinaryOperator::Add, Expression::string("a"), Expression::string("b"));
        assert!(matches!(
            expression_type(&root, &expr),
            Err(EvaluationError::InstructionNotImplemented { .. })
        ));
    }

    #[test]
    fn unresolved_identifier_is_not_found() {
        let root = CompilationRoot::new();
        assert!(matches!(
            expression_type(&root, &Expression::ident("y")),
            Err(EvaluationError::LocalVariableNotFound { .. })
        ));
    }
}

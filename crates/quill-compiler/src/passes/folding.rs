//! Constant folding.
//!
//! Binary arithmetic whose operands are both numeric literals is replaced
//! by its result, children first, so `1 + 2 * 3` becomes `7`. Integer
//! arithmetic is exact and checked: an overflow or a division by zero
//! leaves the expression as written. A floating operand makes the result
//! floating. Comparisons are never folded.

use ordered_float::OrderedFloat;
use quill_core::ast::{
    AssignmentExpression, BinaryExpression, BinaryOperator, ElseBranch, Expression, IfStatement, Literal,
    LiteralExpression, MethodCall, ReturnStatement, Statement, TypeCast, VariableDeclaration,
};

pub fn fold_statement(stmt: Statement) -> Statement {
    match stmt {
        Statement::Expression(e) => Statement::Expression(fold_expression(e)),
        Statement::VariableDeclaration(d) => Statement::VariableDeclaration(VariableDeclaration {
            initializer: d.initializer.map(fold_expression),
            ..d
        }),
        Statement::Return(r) => Statement::Return(ReturnStatement {
            value: r.value.map(fold_expression),
            span: r.span,
        }),
        Statement::If(i) => Statement::If(IfStatement {
            condition: fold_expression(i.condition),
            then_branch: Box::new(fold_statement(*i.then_branch)),
            else_branch: i.else_branch.map(|b| Box::new(fold_else(*b))),
            span: i.span,
        }),
        Statement::Block(mut b) => {
            b.statements = b.statements.into_iter().map(fold_statement).collect();
            Statement::Block(b)
        }
        Statement::Assembly(a) => Statement::Assembly(a),
    }
}

fn fold_else(branch: ElseBranch) -> ElseBranch {
    ElseBranch {
        condition: branch.condition.map(fold_expression),
        body: Box::new(fold_statement(*branch.body)),
        next: branch.next.map(|n| Box::new(fold_else(*n))),
        span: branch.span,
    }
}

pub fn fold_expression(expr: Expression) -> Expression {
    match expr {
        Expression::Binary(b) => {
            let left = fold_expression(*b.left);
            let right = fold_expression(*b.right);
            if let Some(value) = fold_literals(b.operator, &left, &right) {
                return Expression::Literal(LiteralExpression { value, span: b.span });
            }
            Expression::Binary(BinaryExpression {
                operator: b.operator,
                left: Box::new(left),
                right: Box::new(right),
                span: b.span,
            })
        }
        Expression::Assignment(a) => Expression::Assignment(AssignmentExpression {
            value: Box::new(fold_expression(*a.value)),
            ..a
        }),
        Expression::Call(c) => Expression::Call(MethodCall {
            arguments: c.arguments.into_iter().map(fold_expression).collect(),
            ..c
        }),
        Expression::Cast(c) => Expression::Cast(TypeCast {
            expression: Box::new(fold_expression(*c.expression)),
            ..c
        }),
        other => other,
    }
}

fn literal(expr: &Expression) -> Option<&Literal> {
    match expr {
        Expression::Literal(l) => Some(&l.value),
        _ => None,
    }
}

fn fold_literals(op: BinaryOperator, left: &Expression, right: &Expression) -> Option<Literal> {
    if op.is_comparison() {
        return None;
    }
    match (literal(left)?, literal(right)?) {
        (Literal::Numeric(a), Literal::Numeric(b)) => fold_integers(op, *a, *b).map(Literal::Numeric),
        (a, b) => {
            let a = as_float(a)?;
            let b = as_float(b)?;
            fold_floats(op, a, b).map(|v| Literal::Floating(OrderedFloat(v)))
        }
    }
}

fn as_float(lit: &Literal) -> Option<f64> {
    match lit {
        Literal::Numeric(v) => Some(*v as f64),
        Literal::Floating(v) => Some(v.0),
        _ => None,
    }
}

fn fold_integers(op: BinaryOperator, a: i128, b: i128) -> Option<i128> {
    match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Sub => a.checked_sub(b),
        BinaryOperator::Mul => a.checked_mul(b),
        BinaryOperator::Div => a.checked_div(b),
        BinaryOperator::Rem => a.checked_rem(b),
        BinaryOperator::Equal | BinaryOperator::NotEqual => None,
    }
}

fn fold_floats(op: BinaryOperator, a: f64, b: f64) -> Option<f64> {
    match op {
        BinaryOperator::Add => Some(a + b),
        BinaryOperator::Sub => Some(a - b),
        BinaryOperator::Mul => Some(a * b),
        BinaryOperator::Div if b != 0.0 => Some(a / b),
        BinaryOperator::Rem if b != 0.0 => Some(a % b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOperator, l: Expression, r: Expression) -> Expression {
        Expression::binary(op, l, r)
    }

    #[test]
    fn folds_children_first() {
        let expr = bin(
            BinaryOperator::Add,
            Expression::int(1),
            bin(BinaryOperator::Mul, Expression::int(2), Expression::int(3)),
        );
        assert_eq!(fold_expression(expr).as_integer(), Some(7));
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let expr = bin(BinaryOperator::Div, Expression::int(-7), Expression::int(2));
        assert_eq!(fold_expression(expr).as_integer(), Some(-3));
        let expr = bin(BinaryOperator::Rem, Expression::int(-7), Expression::int(2));
        assert_eq!(fold_expression(expr).as_integer(), Some(-1));
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let expr = bin(BinaryOperator::Div, Expression::int(1), Expression::int(0));
        assert!(matches!(fold_expression(expr), Expression::Binary(_)));
    }

    #[test]
    fn mixed_operands_fold_to_float() {
        let expr = bin(BinaryOperator::Mul, Expression::int(2), Expression::float(1.5));
        assert_eq!(fold_expression(expr), Expression::float(3.0));
    }

    #[test]
    fn identifiers_block_folding_but_not_of_siblings() {
        let expr = bin(
            BinaryOperator::Add,
            Expression::ident("x"),
            bin(BinaryOperator::Sub, Expression::int(10), Expression::int(4)),
        );
        let Expression::Binary(folded) = fold_expression(expr) else {
            panic!("outer expression must stay binary");
        };
        assert_eq!(folded.right.as_integer(), Some(6));
    }

    #[test]
    fn comparisons_stay() {
        let expr = bin(BinaryOperator::Equal, Expression::int(1), Expression::int(1));
        assert!(matches!(fold_expression(expr), Expression::Binary(_)));
    }

    #[test]
    fn folding_reaches_nested_statements() {
        let stmt = Statement::if_(
            Expression::boolean(true),
            Statement::block(vec![Statement::ret(Some(bin(
                BinaryOperator::Add,
                Expression::int(2),
                Expression::int(3),
            )))]),
            None,
        );
        let Statement::If(folded) = fold_statement(stmt) else {
            panic!("if must stay an if");
        };
        let Statement::Block(block) = *folded.then_branch else {
            panic!("then branch must stay a block");
        };
        assert_eq!(block.statements[0], Statement::ret(Some(Expression::int(5))));
    }
}

//! Range and coercion checking.
//!
//! Runs after resolution, when every expression has a type. Wherever a
//! value flows into a typed slot (an assignment, a call argument, a return
//! value) the value's type must be assignable to the slot's:
//!
//! - an integer literal that does not fit an integer slot is clamped to
//!   the bound it exceeds and a `NumericOverflow` warning is raised;
//! - a concrete value of a different but assignable type is wrapped in an
//!   implicit cast;
//! - anything else is an `InvalidImplicitCast`.
//!
//! Conditions must be `bool` and return statements must agree with the
//! method's return type.

use quill_core::ast::{
    AssignmentExpression, BinaryExpression, ElseBranch, Expression, IfStatement, Literal, LiteralExpression,
    MethodCall, ReturnStatement, Statement, TypeCast,
};
use quill_core::{EvaluationError, MethodId, PrimitiveType, ScriptTable};
use tracing::warn;

use crate::conversion::common_type;
use crate::program::CompilationRoot;
use crate::typing::expression_type;

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(root: &mut CompilationRoot, scripts: &mut ScriptTable) {
    for id in root.method_ids() {
        if root.method(id).external {
            continue;
        }
        let statements = root.method_mut(id).take_statements();
        let mut checker = Checker::new(root, id);
        let checked = checker.check_block(statements);
        let Checker { errors, warnings, .. } = checker;

        let script = root.method(id).script;
        root.method_mut(id).code_statements = checked;
        for error in errors {
            scripts.throw_error(script, error);
        }
        for warning in warnings {
            scripts.throw_warning(script, warning);
        }
    }
}

struct Checker<'a> {
    root: &'a CompilationRoot,
    method: MethodId,
    errors: Vec<EvaluationError>,
    warnings: Vec<EvaluationError>,
}

impl<'a> Checker<'a> {
    fn new(root: &'a CompilationRoot, method: MethodId) -> Self {
        Self {
            root,
            method,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn check_block(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            match self.check_statement(stmt) {
                Ok(stmt) => out.push(stmt),
                Err(err) => self.errors.push(err),
            }
        }
        out
    }

    fn check_statement(&mut self, stmt: Statement) -> Result<Statement, EvaluationError> {
        match stmt {
            Statement::Expression(e) => Ok(Statement::Expression(self.check_expression(e)?)),
            Statement::VariableDeclaration(d) => Err(EvaluationError::InstructionNotImplemented {
                construct: format!("unresolved declaration of '{}'", d.name),
                span: d.span,
            }),
            Statement::Return(r) => self.check_return(r),
            Statement::If(i) => Ok(Statement::If(IfStatement {
                condition: self.check_condition(i.condition)?,
                then_branch: Box::new(self.check_statement(*i.then_branch)?),
                else_branch: match i.else_branch {
                    Some(b) => Some(Box::new(self.check_else(*b)?)),
                    None => None,
                },
                span: i.span,
            })),
            Statement::Block(mut b) => {
                b.statements = self.check_block(b.statements);
                Ok(Statement::Block(b))
            }
            Statement::Assembly(a) => Ok(Statement::Assembly(a)),
        }
    }

    fn check_else(&mut self, branch: ElseBranch) -> Result<ElseBranch, EvaluationError> {
        Ok(ElseBranch {
            condition: branch.condition.map(|c| self.check_condition(c)).transpose()?,
            body: Box::new(self.check_statement(*branch.body)?),
            next: match branch.next {
                Some(n) => Some(Box::new(self.check_else(*n)?)),
                None => None,
            },
            span: branch.span,
        })
    }

    fn check_condition(&mut self, condition: Expression) -> Result<Expression, EvaluationError> {
        let condition = self.check_expression(condition)?;
        let ty = expression_type(self.root, &condition)?;
        if ty != PrimitiveType::Bool {
            return Err(EvaluationError::InvalidCondition {
                found: ty,
                span: condition.span(),
            });
        }
        Ok(condition)
    }

    fn check_return(&mut self, ret: ReturnStatement) -> Result<Statement, EvaluationError> {
        let method = self.root.method(self.method);
        let expected = method.return_type;
        let value = match (ret.value, expected) {
            (None, PrimitiveType::Void) => None,
            (None, _) => {
                return Err(EvaluationError::InvalidReturn {
                    method: method.name.to_string(),
                    expected,
                    found: PrimitiveType::Void,
                    span: ret.span,
                });
            }
            (Some(value), PrimitiveType::Void) => {
                return Err(EvaluationError::InvalidReturn {
                    method: method.name.to_string(),
                    expected,
                    found: expression_type(self.root, &value)?,
                    span: ret.span,
                });
            }
            (Some(value), _) => {
                let value = self.check_expression(value)?;
                Some(self.coerce(value, expected)?)
            }
        };
        Ok(Statement::Return(ReturnStatement { value, span: ret.span }))
    }

    fn check_expression(&mut self, expr: Expression) -> Result<Expression, EvaluationError> {
        match expr {
            Expression::Literal(_) | Expression::Identifier(_) => Ok(expr),
            Expression::Binary(b) => {
                let mut left = self.check_expression(*b.left)?;
                let mut right = self.check_expression(*b.right)?;
                let common = common_type(
                    expression_type(self.root, &left)?,
                    expression_type(self.root, &right)?,
                    b.span,
                )?;
                // A literal operand is loaded as the common type.
                if common.is_integer() && !common.is_generic() {
                    left = self.fit_operand(left, common);
                    right = self.fit_operand(right, common);
                }
                let checked = Expression::Binary(BinaryExpression {
                    operator: b.operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    span: b.span,
                });
                expression_type(self.root, &checked)?;
                Ok(checked)
            }
            Expression::Assignment(a) => {
                let target = expression_type(self.root, &Expression::Identifier(a.assignee.clone()))?;
                let value = self.check_expression(*a.value)?;
                Ok(Expression::Assignment(AssignmentExpression {
                    value: Box::new(self.coerce(value, target)?),
                    ..a
                }))
            }
            Expression::Call(call) => {
                let Some(method) = call.resolved else {
                    return Err(EvaluationError::MethodNotFound {
                        name: call.target.to_string(),
                        span: call.span,
                    });
                };
                let params = self.root.method(method).parameter_types();
                let mut arguments = Vec::with_capacity(call.arguments.len());
                for (arg, ty) in call.arguments.into_iter().zip(params) {
                    let arg = self.check_expression(arg)?;
                    arguments.push(self.coerce(arg, ty)?);
                }
                Ok(Expression::Call(MethodCall { arguments, ..call }))
            }
            Expression::Cast(c) => Ok(Expression::Cast(TypeCast {
                expression: Box::new(self.check_expression(*c.expression)?),
                ..c
            })),
        }
    }

    /// Make `value` fit a slot of type `target`.
    fn coerce(&mut self, value: Expression, target: PrimitiveType) -> Result<Expression, EvaluationError> {
        if let Some(n) = value.as_integer() {
            if target.is_integer() && !target.is_generic() {
                return Ok(self.clamp_literal(n, target, value));
            }
        }

        let ty = expression_type(self.root, &value)?;
        if ty == target {
            return Ok(value);
        }
        if !ty.is_assignable_to(target) {
            return Err(EvaluationError::InvalidImplicitCast {
                from: ty,
                to: target,
                span: value.span(),
            });
        }
        // Generic values take their type from the slot during lowering.
        if ty.is_generic() {
            return Ok(value);
        }
        Ok(Expression::cast(value, target))
    }

    fn fit_operand(&mut self, operand: Expression, common: PrimitiveType) -> Expression {
        match operand.as_integer() {
            Some(n) => self.clamp_literal(n, common, operand),
            None => operand,
        }
    }

    fn clamp_literal(&mut self, n: i128, target: PrimitiveType, value: Expression) -> Expression {
        let clamped = n.clamp(target.min_value(), target.max_value());
        if clamped == n {
            return value;
        }
        let span = value.span();
        warn!(value = %n, target = %target, clamped = %clamped, "integer literal out of range");
        self.warnings.push(EvaluationError::NumericOverflow {
            value: n,
            target,
            clamped,
            span,
        });
        Expression::Literal(LiteralExpression {
            value: Literal::Numeric(clamped),
            span,
        })
    }
}

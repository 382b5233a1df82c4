//! IL lowering.
//!
//! Walks the checked statements of each method and emits stack IL:
//!
//! | Construct            | IL                                              |
//! |----------------------|-------------------------------------------------|
//! | literal              | `LdConst <type>, <value>`                       |
//! | identifier           | `GetLocal <index>`                              |
//! | `a op b`             | `b`, `Conv`?, `a`, `Conv`?, `<op> <common>`     |
//! | `x = v`              | `v`, `Conv`?, `SetLocal <index>`                |
//! | call                 | arguments in order, `CallStatic <ret>, <ref>`   |
//! | `if`/`elif`/`else`   | condition, `If`, body, `Else`, ..., `EndIf`s    |
//! | `return v`           | `v`, `Ret`                                      |
//!
//! Expression statements that leave a value end with `Pop`. Inline
//! assembly is skipped.

use quill_core::ast::{BinaryOperator, ElseBranch, Expression, Literal, Statement};
use quill_core::{EvaluationError, MethodId, PrimitiveType, ScriptTable};
use tracing::debug;

use crate::conversion::common_type;
use crate::il::{ConditionKind, Instruction, IntermediateInstruction, op};
use crate::program::CompilationRoot;
use crate::typing::expression_type;

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(root: &mut CompilationRoot, scripts: &mut ScriptTable) {
    for id in root.method_ids() {
        if root.method(id).external {
            continue;
        }
        let statements = root.method_mut(id).take_statements();
        let mut lowerer = Lowerer::new(root, id);
        for stmt in &statements {
            let mark = lowerer.code.len();
            if let Err(err) = lowerer.lower_statement(stmt) {
                lowerer.code.truncate(mark);
                lowerer.errors.push(err);
            }
        }
        let Lowerer { code, errors, .. } = lowerer;

        let method = root.method_mut(id);
        debug!(method = %method.name, instructions = code.len(), "lowered");
        method.inter_lang = code;
        method.compiled = true;
        let script = method.script;
        for error in errors {
            scripts.throw_error(script, error);
        }
    }
}

struct Lowerer<'a> {
    root: &'a CompilationRoot,
    method: MethodId,
    code: Vec<IntermediateInstruction>,
    errors: Vec<EvaluationError>,
}

impl<'a> Lowerer<'a> {
    fn new(root: &'a CompilationRoot, method: MethodId) -> Self {
        Self {
            root,
            method,
            code: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn emit(&mut self, instruction: IntermediateInstruction) {
        self.code.push(instruction);
    }

    fn lower_statement(&mut self, stmt: &Statement) -> Result<(), EvaluationError> {
        match stmt {
            Statement::Expression(e) => {
                let pushed = self.lower_expression(e, None)?;
                if pushed != PrimitiveType::Void {
                    self.emit(op::pop());
                }
            }
            Statement::VariableDeclaration(d) => {
                return Err(EvaluationError::InstructionNotImplemented {
                    construct: format!("unresolved declaration of '{}'", d.name),
                    span: d.span,
                });
            }
            Statement::Return(r) => {
                if let Some(value) = &r.value {
                    let expected = self.root.method(self.method).return_type;
                    self.lower_converted(value, expected)?;
                }
                self.emit(op::ret());
            }
            Statement::If(i) => {
                self.lower_condition(&i.condition)?;
                self.lower_statement(&i.then_branch)?;
                if let Some(branch) = &i.else_branch {
                    self.lower_else(branch)?;
                }
                self.emit(op::end_if());
            }
            Statement::Block(b) => {
                for s in &b.statements {
                    self.lower_statement(s)?;
                }
            }
            Statement::Assembly(a) => {
                debug!(at = %a.span, "inline assembly is not lowered");
            }
        }
        Ok(())
    }

    fn lower_else(&mut self, branch: &ElseBranch) -> Result<(), EvaluationError> {
        self.emit(op::else_());
        match &branch.condition {
            Some(condition) => {
                self.lower_condition(condition)?;
                self.lower_statement(&branch.body)?;
                if let Some(next) = &branch.next {
                    self.lower_else(next)?;
                }
                self.emit(op::end_if());
            }
            None => self.lower_statement(&branch.body)?,
        }
        Ok(())
    }

    /// Emit a condition and the `If` that consumes it.
    ///
    /// `x == <int>` and `x != <int>` compare against the literal inside the
    /// `If` instead of materialising a `bool`.
    fn lower_condition(&mut self, condition: &Expression) -> Result<(), EvaluationError> {
        if let Expression::Binary(b) = condition {
            let kind = match b.operator {
                BinaryOperator::Equal => Some(ConditionKind::Equal),
                BinaryOperator::NotEqual => Some(ConditionKind::Unequal),
                _ => None,
            };
            if let (Some(kind), Some(value)) = (kind, b.right.as_integer()) {
                let left = expression_type(self.root, &b.left)?;
                if left.is_integer() && !left.is_generic() {
                    self.lower_expression(&b.left, None)?;
                    self.emit(op::if_(kind, Some(value)));
                    return Ok(());
                }
            }
        }
        self.lower_converted(condition, PrimitiveType::Bool)?;
        self.emit(op::if_(ConditionKind::True, None));
        Ok(())
    }

    /// Lower `expr` and convert the result to `target` if it differs.
    fn lower_converted(&mut self, expr: &Expression, target: PrimitiveType) -> Result<(), EvaluationError> {
        let pushed = self.lower_expression(expr, Some(target))?;
        if pushed != target {
            self.emit(op::conv(target));
        }
        Ok(())
    }

    /// Lower an expression and return the type of the value it pushes
    /// (`Void` when it pushes nothing).
    ///
    /// `expected` types literals that have no type of their own yet.
    fn lower_expression(
        &mut self,
        expr: &Expression,
        expected: Option<PrimitiveType>,
    ) -> Result<PrimitiveType, EvaluationError> {
        match expr {
            Expression::Literal(l) => {
                let (ty, text) = literal_constant(&l.value, expected);
                self.emit(op::ld_const(ty, text));
                Ok(ty)
            }
            Expression::Identifier(node) => {
                let local = node.local.ok_or_else(|| EvaluationError::LocalVariableNotFound {
                    name: node.symbol.to_string(),
                    span: node.span,
                })?;
                self.emit(op::get_local(local.index));
                Ok(local.ty)
            }
            Expression::Binary(b) => {
                let left = expression_type(self.root, &b.left)?;
                let right = expression_type(self.root, &b.right)?;
                let mut common = common_type(left, right, b.span)?;
                if common.is_generic() {
                    common = match expected {
                        Some(t) if !t.is_generic() && common.is_assignable_to(t) => t,
                        _ => common.concrete(),
                    };
                }

                self.lower_converted(&b.right, common)?;
                self.lower_converted(&b.left, common)?;
                let instruction = match b.operator {
                    BinaryOperator::Add => Instruction::Add,
                    BinaryOperator::Sub => Instruction::Sub,
                    BinaryOperator::Mul => Instruction::Mul,
                    BinaryOperator::Div => Instruction::Div,
                    BinaryOperator::Rem => Instruction::Rem,
                    BinaryOperator::Equal => Instruction::Equals,
                    BinaryOperator::NotEqual => Instruction::Unequals,
                };
                self.emit(op::binary(instruction, common));
                Ok(if b.operator.is_comparison() {
                    PrimitiveType::Bool
                } else {
                    common
                })
            }
            Expression::Assignment(a) => {
                let local = a.assignee.local.ok_or_else(|| EvaluationError::LocalVariableNotFound {
                    name: a.assignee.symbol.to_string(),
                    span: a.assignee.span,
                })?;
                self.lower_converted(&a.value, local.ty)?;
                self.emit(op::set_local(local.index));
                Ok(PrimitiveType::Void)
            }
            Expression::Call(call) => {
                let target = call.resolved.ok_or_else(|| EvaluationError::MethodNotFound {
                    name: call.target.to_string(),
                    span: call.span,
                })?;
                let root = self.root;
                let callee = root.method(target);
                for (arg, param) in call.arguments.iter().zip(&callee.parameters) {
                    self.lower_converted(arg, param.ty)?;
                }
                let reference = root.global_reference(target);
                self.emit(op::call_static(callee.return_type, &reference));
                Ok(callee.return_type)
            }
            Expression::Cast(c) => {
                self.lower_converted(&c.expression, c.target)?;
                Ok(c.target)
            }
        }
    }
}

/// IL type and text of a literal, typed by context where it has none.
fn literal_constant(value: &Literal, expected: Option<PrimitiveType>) -> (PrimitiveType, String) {
    match value {
        Literal::Numeric(v) => {
            let ty = match expected {
                Some(t) if (t.is_numeric() || t == PrimitiveType::Char) && !t.is_generic() => t,
                _ => PrimitiveType::GenericNumber.concrete(),
            };
            (ty, v.to_string())
        }
        Literal::Floating(v) => {
            let ty = match expected {
                Some(t) if t.is_floating() && !t.is_generic() => t,
                _ => PrimitiveType::GenericFloating.concrete(),
            };
            (ty, v.0.to_string())
        }
        Literal::String(s) => (PrimitiveType::Str, s.clone()),
        Literal::Boolean(b) => (PrimitiveType::Bool, b.to_string()),
        Literal::Null => (PrimitiveType::Ptr, "0".to_string()),
    }
}

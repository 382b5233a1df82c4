//! Resolution pass.
//!
//! Binds every identifier to a local or parameter, every call to one
//! overload, and turns declarations into assignments. Each method gets a
//! freshly built statement list; a statement that fails to resolve is
//! reported on the method's script and left out of it.
//!
//! ```text
//! u8 x = 300;        ──►  x@0 = 300;
//! Log(x);            ──►  Log(x@0)  with resolved = App:Log?u8
//! ```

use quill_core::ast::{
    AssignmentExpression, ElseBranch, Expression, IdentifierNode, IfStatement, LocalRef, ReturnStatement,
    Statement,
};
use quill_core::{EvaluationError, Identifier, MethodId, NamespaceId, ScriptTable};
use tracing::debug;

use crate::overload::resolve_overload;
use crate::program::CompilationRoot;
use crate::scope::LocalScope;
use crate::typing::expression_type;

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(root: &mut CompilationRoot, scripts: &mut ScriptTable) {
    for id in root.method_ids() {
        if root.method(id).external {
            continue;
        }
        let statements = root.method_mut(id).take_statements();
        let script = root.method(id).script;

        let mut resolver = Resolver::new(root, id);
        let resolved = resolver.resolve_block(statements);
        let errors = std::mem::take(&mut resolver.errors);

        debug!(method = %root.method(id).name, locals = root.method(id).local_data.len(), "resolved");
        root.method_mut(id).code_statements = resolved;
        for error in errors {
            scripts.throw_error(script, error);
        }
    }
}

struct Resolver<'a> {
    root: &'a mut CompilationRoot,
    method: MethodId,
    namespace: NamespaceId,
    scope: LocalScope,
    errors: Vec<EvaluationError>,
}

impl<'a> Resolver<'a> {
    fn new(root: &'a mut CompilationRoot, method: MethodId) -> Self {
        let item = root.method(method);
        let namespace = item.namespace;
        let scope = LocalScope::with_parameters(item.parameters.iter().map(|p| (p.name.as_str(), p.ty)));
        Self {
            root,
            method,
            namespace,
            scope,
            errors: Vec::new(),
        }
    }

    fn resolve_block(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            match self.resolve_statement(stmt) {
                Ok(stmt) => out.push(stmt),
                Err(err) => self.errors.push(err),
            }
        }
        out
    }

    /// Resolve a branch body in its own scope.
    fn resolve_nested(&mut self, stmt: Statement) -> Result<Statement, EvaluationError> {
        self.scope.push_scope();
        let result = self.resolve_statement(stmt);
        self.scope.pop_scope();
        result
    }

    fn resolve_statement(&mut self, stmt: Statement) -> Result<Statement, EvaluationError> {
        match stmt {
            Statement::Expression(e) => Ok(Statement::Expression(self.resolve_expression(e)?)),
            Statement::VariableDeclaration(decl) => {
                let Some(default) = Expression::default_for(decl.ty) else {
                    return Err(EvaluationError::InvalidDeclarationType {
                        name: decl.name,
                        ty: decl.ty,
                        span: decl.span,
                    });
                };
                // Resolve before declaring so `i32 x = x;` does not see itself.
                let value = match decl.initializer {
                    Some(init) => self.resolve_expression(init),
                    None => Ok(default),
                };
                let index = self.root.method_mut(self.method).alloc(decl.ty);
                let local = LocalRef::local(index, decl.ty);
                self.scope.declare(&decl.name, local, decl.span)?;

                Ok(Statement::Expression(Expression::Assignment(AssignmentExpression {
                    assignee: IdentifierNode {
                        symbol: Identifier::new([decl.name]),
                        local: Some(local),
                        span: decl.span,
                    },
                    value: Box::new(value?),
                    span: decl.span,
                })))
            }
            Statement::Return(r) => Ok(Statement::Return(ReturnStatement {
                value: r.value.map(|v| self.resolve_expression(v)).transpose()?,
                span: r.span,
            })),
            Statement::If(i) => {
                let condition = self.resolve_expression(i.condition)?;
                let then_branch = Box::new(self.resolve_nested(*i.then_branch)?);
                let else_branch = match i.else_branch {
                    Some(b) => Some(Box::new(self.resolve_else(*b)?)),
                    None => None,
                };
                Ok(Statement::If(IfStatement {
                    condition,
                    then_branch,
                    else_branch,
                    span: i.span,
                }))
            }
            Statement::Block(mut b) => {
                self.scope.push_scope();
                b.statements = self.resolve_block(b.statements);
                self.scope.pop_scope();
                Ok(Statement::Block(b))
            }
            Statement::Assembly(a) => Ok(Statement::Assembly(a)),
        }
    }

    fn resolve_else(&mut self, branch: ElseBranch) -> Result<ElseBranch, EvaluationError> {
        let condition = branch.condition.map(|c| self.resolve_expression(c)).transpose()?;
        let body = Box::new(self.resolve_nested(*branch.body)?);
        let next = match branch.next {
            Some(n) => Some(Box::new(self.resolve_else(*n)?)),
            None => None,
        };
        Ok(ElseBranch {
            condition,
            body,
            next,
            span: branch.span,
        })
    }

    fn resolve_identifier(&self, mut node: IdentifierNode) -> Result<IdentifierNode, EvaluationError> {
        let found = match node.symbol.segments() {
            [name] => self.scope.lookup(name),
            _ => None,
        };
        node.local = Some(found.ok_or_else(|| EvaluationError::LocalVariableNotFound {
            name: node.symbol.to_string(),
            span: node.span,
        })?);
        Ok(node)
    }

    fn resolve_expression(&mut self, expr: Expression) -> Result<Expression, EvaluationError> {
        match expr {
            Expression::Literal(l) => Ok(Expression::Literal(l)),
            Expression::Identifier(node) => Ok(Expression::Identifier(self.resolve_identifier(node)?)),
            Expression::Binary(mut b) => {
                b.left = Box::new(self.resolve_expression(*b.left)?);
                b.right = Box::new(self.resolve_expression(*b.right)?);
                Ok(Expression::Binary(b))
            }
            Expression::Assignment(a) => {
                let value = self.resolve_expression(*a.value)?;
                Ok(Expression::Assignment(AssignmentExpression {
                    assignee: self.resolve_identifier(a.assignee)?,
                    value: Box::new(value),
                    span: a.span,
                }))
            }
            Expression::Call(mut call) => {
                let arguments = call
                    .arguments
                    .into_iter()
                    .map(|arg| self.resolve_expression(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let arg_types = arguments
                    .iter()
                    .map(|arg| expression_type(self.root, arg))
                    .collect::<Result<Vec<_>, _>>()?;

                let candidates = self.root.find_overloads(&call.target, self.namespace);
                if candidates.is_empty() {
                    return Err(EvaluationError::MethodNotFound {
                        name: call.target.to_string(),
                        span: call.span,
                    });
                }
                let chosen = resolve_overload(self.root, &candidates, &arg_types).ok_or_else(|| {
                    EvaluationError::MethodOverloadNotFound {
                        name: call.target.to_string(),
                        arguments: arg_types.iter().map(|t| t.tag()).collect::<Vec<_>>().join(", "),
                        span: call.span,
                    }
                })?;

                call.arguments = arguments;
                call.resolved = Some(chosen.method);
                Ok(Expression::Call(call))
            }
            Expression::Cast(mut c) => {
                c.expression = Box::new(self.resolve_expression(*c.expression)?);
                Ok(Expression::Cast(c))
            }
        }
    }
}

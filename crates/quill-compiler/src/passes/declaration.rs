//! Declaration pass.
//!
//! Builds the namespace and method arenas from the syntax trees of every
//! script. Method bodies are copied in through constant folding; nothing
//! is resolved yet, so a method may call one declared later or in another
//! script.

use quill_core::ast::{MethodDeclarationNode, NamespaceMember, ScriptNode, TopLevelNode};
use quill_core::{EvaluationError, NamespaceId, PrimitiveType, ScriptTable};
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use super::folding::fold_statement;
use crate::program::{CompilationRoot, FieldItem, ParameterItem};

#[cfg_attr(feature = "profiling", profiling::function)]
pub fn run(root: &mut CompilationRoot, scripts: &mut ScriptTable, nodes: Vec<ScriptNode>) {
    for node in nodes {
        let script = node.script;
        let external = scripts.is_header(script);
        for item in node.body {
            match item {
                TopLevelNode::Namespace(ns) => {
                    let id = root.add_namespace(ns.name, script);
                    for member in ns.body {
                        match member {
                            NamespaceMember::Method(method) => {
                                declare_method(root, scripts, id, method, external);
                            }
                            NamespaceMember::Field(field) => root.add_field(
                                id,
                                FieldItem {
                                    name: field.name,
                                    ty: field.ty,
                                },
                            ),
                        }
                    }
                }
                TopLevelNode::Method(method) => {
                    let id = root.implicit_namespace(script);
                    declare_method(root, scripts, id, method, external);
                }
                TopLevelNode::Statement(stmt) => {
                    warn!(script = script.0, at = %stmt.span(), "statement outside of a method is ignored");
                }
            }
        }
    }
    debug!(
        namespaces = root.namespaces().len(),
        methods = root.methods().len(),
        "declaration pass complete"
    );
}

fn declare_method(
    root: &mut CompilationRoot,
    scripts: &mut ScriptTable,
    namespace: NamespaceId,
    method: MethodDeclarationNode,
    external: bool,
) {
    let script = root.namespace(namespace).script;

    if let Some(bad) = method
        .parameters
        .iter()
        .find(|p| p.ty == PrimitiveType::Void || p.ty.is_generic())
    {
        scripts.throw_error(
            script,
            EvaluationError::InvalidDeclarationType {
                name: bad.name.clone(),
                ty: bad.ty,
                span: bad.span,
            },
        );
        return;
    }

    let repeated = {
        let mut names = FxHashSet::default();
        method
            .parameters
            .iter()
            .find(|p| !names.insert(p.name.as_str()))
            .map(|p| (p.name.clone(), p.span))
    };
    if let Some((name, span)) = repeated {
        scripts.throw_error(script, EvaluationError::DuplicateLocal { name, span });
        return;
    }

    let parameters: Vec<ParameterItem> = method
        .parameters
        .into_iter()
        .map(|p| ParameterItem { name: p.name, ty: p.ty })
        .collect();
    let signature = format!(
        "{}({})",
        method.name,
        parameters.iter().map(|p| p.ty.tag()).collect::<Vec<_>>().join(", ")
    );

    match root.add_method(
        namespace,
        method.name,
        method.return_type,
        parameters,
        external,
        method.span,
    ) {
        Ok(id) => {
            if !external {
                root.method_mut(id).code_statements = method.body.into_iter().map(fold_statement).collect();
            }
        }
        Err(_) => scripts.throw_error(
            script,
            EvaluationError::InvalidMethodOverloading {
                namespace: root.namespace(namespace).name.to_string(),
                signature,
                span: method.span,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ast::{Expression, MethodDeclarationNode, NamespaceNode, ParameterNode, Statement};
    use quill_core::{BuildError, ScriptKind};

    fn method(name: &str, params: Vec<ParameterNode>, body: Vec<Statement>) -> NamespaceMember {
        NamespaceMember::Method(MethodDeclarationNode::new(PrimitiveType::Void, name, params, body))
    }

    #[test]
    fn duplicate_overload_is_reported_and_not_registered() {
        let mut scripts = ScriptTable::new();
        let main = scripts.add("main.ql", ScriptKind::Source);
        let ns = NamespaceNode::new(
            "App",
            vec![
                method("Log", vec![ParameterNode::new("a", PrimitiveType::I32)], vec![]),
                method("Log", vec![ParameterNode::new("b", PrimitiveType::I32)], vec![]),
                method("Log", vec![ParameterNode::new("c", PrimitiveType::Str)], vec![]),
            ],
        );
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![ScriptNode::new(main, vec![TopLevelNode::Namespace(ns)])],
        );

        assert_eq!(root.methods().len(), 2);
        let errors = scripts.get(main).unwrap().errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            BuildError::Evaluation(EvaluationError::InvalidMethodOverloading { signature, .. })
                if signature == "Log(i32)"
        ));
    }

    #[test]
    fn header_methods_are_external_and_bodiless() {
        let mut scripts = ScriptTable::new();
        let header = scripts.add(
            "std.qh",
            ScriptKind::Header {
                assembly: String::new(),
            },
        );
        let ns = NamespaceNode::new(
            "Std.Console",
            vec![method(
                "Write",
                vec![ParameterNode::new("s", PrimitiveType::Str)],
                vec![Statement::ret(None)],
            )],
        );
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![ScriptNode::new(header, vec![TopLevelNode::Namespace(ns)])],
        );
        let write = &root.methods()[0];
        assert!(write.external);
        assert!(write.code_statements.is_empty());
    }

    #[test]
    fn loose_methods_go_to_an_implicit_namespace() {
        let mut scripts = ScriptTable::new();
        let main = scripts.add("main.ql", ScriptKind::Source);
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![ScriptNode::new(
                main,
                vec![
                    TopLevelNode::Method(MethodDeclarationNode::new(PrimitiveType::Void, "Helper", vec![], vec![])),
                    TopLevelNode::Statement(Statement::expr(Expression::int(1))),
                ],
            )],
        );
        assert_eq!(root.namespaces().len(), 1);
        assert_eq!(root.global_reference(root.methods()[0].id).to_string(), "__implicit0:Helper?");
        assert!(!scripts.has_errors());
    }

    #[test]
    fn void_parameter_is_rejected() {
        let mut scripts = ScriptTable::new();
        let main = scripts.add("main.ql", ScriptKind::Source);
        let ns = NamespaceNode::new(
            "App",
            vec![method("Bad", vec![ParameterNode::new("v", PrimitiveType::Void)], vec![])],
        );
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![ScriptNode::new(main, vec![TopLevelNode::Namespace(ns)])],
        );
        assert!(root.methods().is_empty());
        assert!(scripts.has_errors());
    }

    #[test]
    fn repeated_parameter_name_is_rejected() {
        let mut scripts = ScriptTable::new();
        let main = scripts.add("main.ql", ScriptKind::Source);
        let ns = NamespaceNode::new(
            "App",
            vec![method(
                "Pair",
                vec![ParameterNode::new("a", PrimitiveType::I32), ParameterNode::new("a", PrimitiveType::I32)],
                vec![],
            )],
        );
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![ScriptNode::new(main, vec![TopLevelNode::Namespace(ns)])],
        );
        assert!(root.methods().is_empty());
        assert!(matches!(
            scripts.get(main).unwrap().errors(),
            [BuildError::Evaluation(EvaluationError::DuplicateLocal { name, .. })] if name == "a"
        ));
    }

    #[test]
    fn same_overload_in_two_scripts_is_reported_on_the_later_one() {
        let mut scripts = ScriptTable::new();
        let first = scripts.add("first.ql", ScriptKind::Source);
        let second = scripts.add("second.ql", ScriptKind::Source);
        let log = || NamespaceNode::new("App", vec![method("Log", vec![ParameterNode::new("v", PrimitiveType::I32)], vec![])]);
        let mut root = CompilationRoot::new();
        run(
            &mut root,
            &mut scripts,
            vec![
                ScriptNode::new(first, vec![TopLevelNode::Namespace(log())]),
                ScriptNode::new(second, vec![TopLevelNode::Namespace(log())]),
            ],
        );
        assert_eq!(root.methods().len(), 1);
        assert!(scripts.get(first).unwrap().errors().is_empty());
        assert!(matches!(
            scripts.get(second).unwrap().errors(),
            [BuildError::Evaluation(EvaluationError::InvalidMethodOverloading { namespace, .. })] if namespace == "App"
        ));
    }
}

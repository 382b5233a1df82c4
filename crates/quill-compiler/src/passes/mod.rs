//! The evaluation pipeline.
//!
//! 1. [`declaration`] registers namespaces and method signatures and folds
//!    constants in method bodies.
//! 2. [`resolution`] binds identifiers to locals and calls to overloads.
//! 3. [`checking`] enforces ranges, coercions, conditions and returns.
//! 4. [`lowering`] turns the checked statements into IL.
//!
//! Each pass records its errors against the script that owns the method
//! and moves on, so one build reports as many problems as it can find.

pub mod checking;
pub mod declaration;
pub mod folding;
pub mod lowering;
pub mod resolution;

use quill_core::ScriptTable;
use quill_core::ast::ScriptNode;
use tracing::{debug, trace};

use crate::program::CompilationRoot;

/// Runs all passes over a set of scripts.
pub struct Evaluator<'s> {
    scripts: &'s mut ScriptTable,
}

impl<'s> Evaluator<'s> {
    pub fn new(scripts: &'s mut ScriptTable) -> Self {
        Self { scripts }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(self, nodes: Vec<ScriptNode>) -> CompilationRoot {
        let mut root = CompilationRoot::new();

        declaration::run(&mut root, self.scripts, nodes);
        trace!("after declaration:\n{root}");

        resolution::run(&mut root, self.scripts);
        trace!("after resolution:\n{root}");

        checking::run(&mut root, self.scripts);
        trace!("after checking:\n{root}");

        lowering::run(&mut root, self.scripts);
        trace!("after lowering:\n{root}");

        debug!(
            methods = root.methods().len(),
            errors = self.scripts.error_count(),
            "evaluation complete"
        );
        root
    }
}

/// Evaluate `nodes`, recording diagnostics in `scripts`.
pub fn evaluate(scripts: &mut ScriptTable, nodes: Vec<ScriptNode>) -> CompilationRoot {
    Evaluator::new(scripts).run(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ast::{Expression, MethodDeclarationNode, NamespaceMember, NamespaceNode, Statement, TopLevelNode};
    use quill_core::{BuildError, EvaluationError, PrimitiveType, ScriptKind};

    #[test]
    fn methods_in_separate_scripts_call_each_other() {
        let mut scripts = ScriptTable::new();
        let a = scripts.add("a.ql", ScriptKind::Source);
        let b = scripts.add("b.ql", ScriptKind::Source);
        let nodes = vec![
            ScriptNode::new(
                a,
                vec![TopLevelNode::Namespace(NamespaceNode::new(
                    "App",
                    vec![NamespaceMember::Method(MethodDeclarationNode::new(
                        PrimitiveType::I32,
                        "Main",
                        vec![],
                        vec![Statement::ret(Some(Expression::call("Lib.Answer", vec![])))],
                    ))],
                ))],
            ),
            ScriptNode::new(
                b,
                vec![TopLevelNode::Namespace(NamespaceNode::new(
                    "Lib",
                    vec![NamespaceMember::Method(MethodDeclarationNode::new(
                        PrimitiveType::I32,
                        "Answer",
                        vec![],
                        vec![Statement::ret(Some(Expression::int(42)))],
                    ))],
                ))],
            ),
        ];

        let root = evaluate(&mut scripts, nodes);
        assert!(!scripts.has_errors(), "{}", scripts.report());
        let main: Vec<String> = root.methods()[0].inter_lang.iter().map(|i| i.to_string()).collect();
        assert_eq!(main, ["call.static i32 Lib:Answer?", "ret"]);
    }

    #[test]
    fn errors_are_attributed_to_the_owning_script() {
        let mut scripts = ScriptTable::new();
        let good = scripts.add("good.ql", ScriptKind::Source);
        let bad = scripts.add("bad.ql", ScriptKind::Source);
        let method = |name: &str, body| {
            vec![TopLevelNode::Namespace(NamespaceNode::new(
                name,
                vec![NamespaceMember::Method(MethodDeclarationNode::new(
                    PrimitiveType::Void,
                    "Run",
                    vec![],
                    body,
                ))],
            ))]
        };
        let nodes = vec![
            ScriptNode::new(good, method("Good", vec![])),
            ScriptNode::new(
                bad,
                method("Bad", vec![Statement::expr(Expression::call("Missing", vec![]))]),
            ),
        ];

        evaluate(&mut scripts, nodes);
        assert!(!scripts.get(good).unwrap().has_errors());
        let errors = scripts.get(bad).unwrap().errors();
        assert!(matches!(
            errors,
            [BuildError::Evaluation(EvaluationError::MethodNotFound { .. })]
        ));
    }
}

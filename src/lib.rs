//! Quill: a compiler from a small typed scripting language to NASM x86
//! assembly and WebAssembly text.
//!
//! # Pipeline
//!
//! ```text
//! ScriptNode[] ──► Evaluator ──► CompilationRoot (IL) ──► Backend ──► text
//!                  declaration                            nasm
//!                  resolution                             wasm
//!                  checking
//!                  lowering
//! ```
//!
//! Parsing is done elsewhere; a [`Build`] receives syntax trees together
//! with the scripts they came from, evaluates them, and emits one target.
//! Diagnostics are collected per script. Any error blocks code
//! generation; warnings do not.
//!
//! # Example
//!
//! ```
//! use quill::{Build, Target};
//! use quill::core::ast::{Expression, MethodDeclarationNode, NamespaceMember, NamespaceNode, ScriptNode, Statement, TopLevelNode};
//! use quill::core::{PrimitiveType, ScriptKind};
//!
//! let mut build = Build::new();
//! let script = build.add_script("main.ql", ScriptKind::Source);
//! build.add_node(ScriptNode::new(
//!     script,
//!     vec![TopLevelNode::Namespace(NamespaceNode::new(
//!         "App",
//!         vec![NamespaceMember::Method(MethodDeclarationNode::new(
//!             PrimitiveType::I32,
//!             "Main",
//!             vec![],
//!             vec![Statement::ret(Some(Expression::int(5)))],
//!         ))],
//!     ))],
//! ));
//!
//! let wat = build.emit(&Target::wasm()).unwrap();
//! assert!(wat.contains("(func $App.Main?"));
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quill_codegen::Backend;
use quill_compiler::CompilationRoot;
use quill_core::ast::ScriptNode;
use quill_core::{CompilingError, ScriptId, ScriptKind, ScriptTable};
use thiserror::Error;
use tracing::{debug, info};

pub use quill_codegen as codegen;
pub use quill_codegen::{NasmOptions, WasmOptions};
pub use quill_compiler as compiler;
pub use quill_core as core;

/// Output target of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Nasm(NasmOptions),
    Wasm(WasmOptions),
}

impl Target {
    pub fn nasm() -> Self {
        Target::Nasm(NasmOptions::default())
    }

    pub fn wasm() -> Self {
        Target::Wasm(WasmOptions::default())
    }

    /// Conventional file extension of the output.
    pub fn extension(&self) -> &'static str {
        match self {
            Target::Nasm(_) => "asm",
            Target::Wasm(_) => "wat",
        }
    }

    fn backend(&self) -> Box<dyn Backend> {
        match self {
            Target::Nasm(options) => Box::new(codegen::NasmBackend::new(options.clone())),
            Target::Wasm(options) => Box::new(codegen::WasmBackend::new(options.clone())),
        }
    }
}

/// Why a build produced no output.
#[derive(Debug, Error)]
pub enum BuildFailure {
    #[error("{0} error(s) reported; code generation skipped")]
    HasErrors(usize),

    #[error(transparent)]
    Compiling(#[from] CompilingError),

    #[error("cannot write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scripts, their syntax trees, and the evaluated program.
#[derive(Debug, Default)]
pub struct Build {
    scripts: ScriptTable,
    nodes: Vec<ScriptNode>,
    root: Option<CompilationRoot>,
}

impl Build {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_script(&mut self, path: impl Into<PathBuf>, kind: ScriptKind) -> ScriptId {
        self.scripts.add(path, kind)
    }

    /// Queue the syntax tree of a script added with [`Build::add_script`].
    ///
    /// Trees added after evaluation start a fresh evaluation.
    pub fn add_node(&mut self, node: ScriptNode) {
        self.root = None;
        self.nodes.push(node);
    }

    pub fn scripts(&self) -> &ScriptTable {
        &self.scripts
    }

    pub fn root(&self) -> Option<&CompilationRoot> {
        self.root.as_ref()
    }

    /// Run every evaluator pass over the queued trees.
    ///
    /// Evaluating again without new trees returns the same program.
    pub fn evaluate(&mut self) -> &CompilationRoot {
        let root = self.take_root();
        self.root.insert(root)
    }

    fn take_root(&mut self) -> CompilationRoot {
        match self.root.take() {
            Some(root) => root,
            None => {
                self.scripts.clear_evaluation();
                quill_compiler::evaluate(&mut self.scripts, self.nodes.clone())
            }
        }
    }

    /// Evaluate if needed and render `target`.
    pub fn emit(&mut self, target: &Target) -> Result<String, BuildFailure> {
        let root = self.take_root();
        let result = self.generate(&root, target);
        self.root = Some(root);
        result
    }

    fn generate(&self, root: &CompilationRoot, target: &Target) -> Result<String, BuildFailure> {
        if self.scripts.has_errors() {
            let count = self.scripts.error_count();
            info!(errors = count, "code generation skipped");
            return Err(BuildFailure::HasErrors(count));
        }
        let backend = target.backend();
        debug!(backend = backend.name(), "emitting");
        Ok(backend.emit(root, &self.scripts)?)
    }

    /// Emit `target` and write it to `path`.
    pub fn compile_to(&mut self, target: &Target, path: impl AsRef<Path>) -> Result<(), BuildFailure> {
        let text = self.emit(target)?;
        let path = path.as_ref();
        write_output(path, &text).map_err(|source| BuildFailure::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), bytes = text.len(), "output written");
        Ok(())
    }
}

/// Write `text` to `path`, creating missing parent directories.
pub fn write_output(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::PrimitiveType;
    use quill_core::ast::{Expression, MethodDeclarationNode, NamespaceMember, NamespaceNode, Statement, TopLevelNode};

    fn main_returning(value: Expression) -> Build {
        let mut build = Build::new();
        let script = build.add_script("main.ql", ScriptKind::Source);
        build.add_node(ScriptNode::new(
            script,
            vec![TopLevelNode::Namespace(NamespaceNode::new(
                "App",
                vec![NamespaceMember::Method(MethodDeclarationNode::new(
                    PrimitiveType::I32,
                    "Main",
                    vec![],
                    vec![Statement::ret(Some(value))],
                ))],
            ))],
        ));
        build
    }

    #[test]
    fn errors_block_code_generation() {
        let mut build = main_returning(Expression::call("Nowhere", vec![]));
        let err = build.emit(&Target::nasm()).unwrap_err();
        assert!(matches!(err, BuildFailure::HasErrors(1)));
        assert!(build.root().is_some());
    }

    #[test]
    fn evaluation_is_reused_between_targets() {
        let mut build = main_returning(Expression::int(5));
        build.emit(&Target::nasm()).unwrap();
        build.emit(&Target::wasm()).unwrap();
        assert_eq!(build.scripts().error_count(), 0);
        assert_eq!(build.root().map(|r| r.methods().len()), Some(1));
    }

    #[test]
    fn new_trees_replace_earlier_diagnostics() {
        let mut build = main_returning(Expression::call("App.Nowhere", vec![]));
        build.evaluate();
        assert_eq!(build.scripts().error_count(), 1);

        let helper = build.add_script("helper.ql", ScriptKind::Source);
        build.add_node(ScriptNode::new(
            helper,
            vec![TopLevelNode::Namespace(NamespaceNode::new(
                "App",
                vec![NamespaceMember::Method(MethodDeclarationNode::new(
                    PrimitiveType::I32,
                    "Nowhere",
                    vec![],
                    vec![Statement::ret(Some(Expression::int(1)))],
                ))],
            ))],
        ));
        assert!(build.root().is_none());
        build.emit(&Target::wasm()).unwrap();
        assert_eq!(build.scripts().error_count(), 0);
    }

    #[test]
    fn output_directories_are_created() {
        let dir = std::env::temp_dir().join(format!("quill-out-{}", std::process::id()));
        let path = dir.join("nested").join("main.wat");
        let mut build = main_returning(Expression::int(5));
        build.compile_to(&Target::wasm(), &path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("App.Main?"));
        fs::remove_dir_all(&dir).unwrap();
    }
}

//! 32-bit x86 backend producing NASM source.
//!
//! Each compiled method becomes a label named after its global reference
//! (`App@Main?`). Header methods are never emitted; the hand-written
//! assembly of header scripts is merged in instead (see [`header`]).
//!
//! Calling convention: the caller reserves the argument area with
//! `SUB ESP, n` and stores the arguments at `[ESP + offset]`; the callee
//! releases it in its epilogue. Results come back in `EAX`.

pub mod asm;
pub mod data;
pub mod frame;
pub mod header;
pub mod method;

use std::fmt::Write as _;

use quill_compiler::{CompilationRoot, GlobalReference};
use quill_core::{CompilingError, MethodId, ScriptTable};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::Backend;
use data::DataTable;
use header::Library;
use method::{Unit, compile_method};

pub(crate) const BACKEND: &str = "nasm";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NasmOptions {
    /// Global reference of the method `_main` jumps to. When unset, the
    /// first parameterless method named `Main` is used.
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NasmBackend {
    options: NasmOptions,
}

impl NasmBackend {
    pub fn new(options: NasmOptions) -> Self {
        Self { options }
    }

    fn entry_point(&self, root: &CompilationRoot) -> Result<Option<MethodId>, CompilingError> {
        match &self.options.entry_point {
            Some(reference) => {
                let unknown = || CompilingError::UnknownCallTarget {
                    reference: reference.clone(),
                };
                let parsed: GlobalReference = reference.parse().map_err(|_| unknown())?;
                root.find_method(&parsed).map(Some).ok_or_else(unknown)
            }
            None => Ok(root
                .methods()
                .iter()
                .find(|m| !m.external && m.parameters.is_empty() && m.name.to_string() == "Main")
                .map(|m| m.id)),
        }
    }
}

impl Backend for NasmBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn emit(&self, root: &CompilationRoot, scripts: &ScriptTable) -> Result<String, CompilingError> {
        let mut data = DataTable::new();
        let mut library = Library::new();
        for script in scripts.iter() {
            if let Some(assembly) = script.assembly() {
                library.merge(assembly, &mut data);
            }
        }

        let mut calls = Vec::new();
        let mut seen_calls = FxHashSet::default();
        let mut unit = Unit {
            data: &mut data,
            calls: &mut calls,
            seen_calls: &mut seen_calls,
        };
        let mut methods = Vec::new();
        for method in root.methods().iter().filter(|m| !m.external) {
            let compiled = compile_method(root, method, &mut unit)?;
            debug!(method = %compiled.label, instructions = compiled.len(), "emitted");
            methods.push(compiled);
        }

        let entry = self.entry_point(root)?;
        let defined: FxHashSet<&str> = methods
            .iter()
            .map(|m| m.label.as_str())
            .chain(library.defined.iter().map(String::as_str))
            .collect();

        let mut out = String::new();
        if entry.is_some() {
            out.push_str("global _main\n");
        }
        for directive in &library.directives {
            let _ = writeln!(out, "{directive}");
        }
        for call in calls.iter().filter(|c| !defined.contains(c.as_str())) {
            let _ = writeln!(out, "extern {call}");
        }

        out.push_str("\nsection .text\n");
        if let Some(entry) = entry {
            let label = root.global_reference(entry).asm_label();
            let _ = writeln!(out, "_main:\n{:<12}{:<8}{label}", "", "JMP");
        }
        for method in methods.iter().chain(&library.methods) {
            method.render(&mut out);
        }

        out.push_str("\nsection .data\n");
        for (label, body) in data.data() {
            let _ = writeln!(out, "{label}: {body}");
        }
        out.push_str("\nsection .rodata\n");
        for (label, body) in data.rodata() {
            let _ = writeln!(out, "{label}: {body}");
        }
        out.push_str("\nsection .bss\n");
        for line in &library.bss {
            let _ = writeln!(out, "{line}");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_compiler::evaluate;
    use quill_core::ast::{
        Expression, MethodDeclarationNode, NamespaceMember, NamespaceNode, ParameterNode, ScriptNode, Statement,
        TopLevelNode,
    };
    use quill_core::{PrimitiveType, ScriptKind};

    fn method(ret: PrimitiveType, name: &str, params: Vec<ParameterNode>, body: Vec<Statement>) -> NamespaceMember {
        NamespaceMember::Method(MethodDeclarationNode::new(ret, name, params, body))
    }

    fn build(members: Vec<NamespaceMember>) -> (CompilationRoot, ScriptTable) {
        let mut scripts = ScriptTable::new();
        let main = scripts.add("main.ql", ScriptKind::Source);
        let root = evaluate(
            &mut scripts,
            vec![ScriptNode::new(
                main,
                vec![TopLevelNode::Namespace(NamespaceNode::new("App", members))],
            )],
        );
        assert!(!scripts.has_errors(), "{}", scripts.report());
        (root, scripts)
    }

    #[test]
    fn main_returning_a_local() {
        let (root, scripts) = build(vec![method(
            PrimitiveType::I32,
            "Main",
            vec![],
            vec![
                Statement::declare("x", PrimitiveType::I32, Some(Expression::int(5))),
                Statement::ret(Some(Expression::ident("x"))),
            ],
        )]);
        let out = NasmBackend::default().emit(&root, &scripts).unwrap();

        assert!(out.starts_with("global _main\n"));
        assert!(out.contains("_main:\n            JMP     App@Main?\n"));
        assert!(out.contains(
            "App@Main?:\n\
             .L0000:     ENTER   4, 0\n\
             .L0001:     MOV     DWORD [EBP - 4], 5\n\
             .L0002:     MOV     EAX, DWORD [EBP - 4]\n\
             .L0003:     LEAVE\n\
             .L0004:     RET\n"
        ), "{out}");
    }

    #[test]
    fn parameters_are_released_by_the_callee() {
        let (root, scripts) = build(vec![
            method(
                PrimitiveType::I32,
                "Add",
                vec![ParameterNode::new("a", PrimitiveType::I32), ParameterNode::new("b", PrimitiveType::I32)],
                vec![Statement::ret(Some(Expression::binary(
                    quill_core::ast::BinaryOperator::Add,
                    Expression::ident("a"),
                    Expression::ident("b"),
                )))],
            ),
            method(
                PrimitiveType::I32,
                "Main",
                vec![],
                vec![Statement::ret(Some(Expression::call(
                    "Add",
                    vec![Expression::int(2), Expression::int(3)],
                )))],
            ),
        ]);
        let out = NasmBackend::default().emit(&root, &scripts).unwrap();

        assert!(out.contains("POP     ECX\n"), "{out}");
        assert!(out.contains("ADD     ESP, 8\n"), "{out}");
        assert!(out.contains("SUB     ESP, 8\n"), "{out}");
        assert!(out.contains("MOV     DWORD [ESP + 0], 2\n"), "{out}");
        assert!(out.contains("MOV     DWORD [ESP + 4], 3\n"), "{out}");
        assert!(out.contains("CALL    App@Add?i32_i32\n"), "{out}");
        assert!(!out.contains("extern"), "{out}");
    }

    #[test]
    fn strings_land_in_rodata() {
        let mut scripts = ScriptTable::new();
        let header = scripts.add(
            "console.qh",
            ScriptKind::Header {
                assembly: String::new(),
            },
        );
        let main = scripts.add("main.ql", ScriptKind::Source);
        let nodes = vec![
            ScriptNode::new(
                header,
                vec![TopLevelNode::Namespace(NamespaceNode::new(
                    "Std.Console",
                    vec![method(
                        PrimitiveType::Void,
                        "Write",
                        vec![ParameterNode::new("s", PrimitiveType::Str)],
                        vec![],
                    )],
                ))],
            ),
            ScriptNode::new(
                main,
                vec![TopLevelNode::Namespace(NamespaceNode::new(
                    "App",
                    vec![method(
                        PrimitiveType::Void,
                        "Main",
                        vec![],
                        vec![Statement::expr(Expression::call(
                            "Std.Console.Write",
                            vec![Expression::string("hi")],
                        ))],
                    )],
                ))],
            ),
        ];
        let root = evaluate(&mut scripts, nodes);
        assert!(!scripts.has_errors(), "{}", scripts.report());

        let out = NasmBackend::default().emit(&root, &scripts).unwrap();
        assert!(out.contains("extern Std.Console@Write?str\n"), "{out}");
        assert!(out.contains("MOV     DWORD [ESP + 0], rod_00000000\n"), "{out}");
        assert!(out.contains("rod_00000000: db 0x03, 0x00, 0x00, 0x00, \"hi\", 0\n"), "{out}");
        assert!(!out.contains("Std.Console@Write?str:"), "{out}");
    }

    #[test]
    fn wide_types_are_rejected() {
        let (root, scripts) = build(vec![method(
            PrimitiveType::I64,
            "Big",
            vec![],
            vec![Statement::ret(Some(Expression::int(1)))],
        )]);
        let err = NasmBackend::default().emit(&root, &scripts).unwrap_err();
        assert!(matches!(
            err,
            CompilingError::UnsupportedType {
                ty: PrimitiveType::I64,
                ..
            }
        ));
    }

    #[test]
    fn explicit_entry_point_must_exist() {
        let (root, scripts) = build(vec![method(PrimitiveType::Void, "Start", vec![], vec![])]);
        let backend = NasmBackend::new(NasmOptions {
            entry_point: Some("App:Start?".to_string()),
        });
        let out = backend.emit(&root, &scripts).unwrap();
        assert!(out.contains("JMP     App@Start?"));

        let missing = NasmBackend::new(NasmOptions {
            entry_point: Some("App:Nope?".to_string()),
        });
        assert!(missing.emit(&root, &scripts).is_err());
    }
}

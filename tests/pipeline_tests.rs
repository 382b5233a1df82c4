//! End-to-end tests: syntax trees in, IL and target text out.

use quill::compiler::{CompilationRoot, GlobalReference, NamespaceName};
use quill::core::ast::{
    BinaryOperator, Expression, MethodDeclarationNode, NamespaceMember, NamespaceNode, ParameterNode, ScriptNode,
    Statement, TopLevelNode,
};
use quill::core::{BuildError, EvaluationError, PrimitiveType, ScriptId, ScriptKind};
use quill::{Build, BuildFailure, Target};
use wasmtime::{Engine, Instance, Module, Store};

fn method(ret: PrimitiveType, name: &str, params: Vec<ParameterNode>, body: Vec<Statement>) -> NamespaceMember {
    NamespaceMember::Method(MethodDeclarationNode::new(ret, name, params, body))
}

fn namespace(script: ScriptId, name: &str, members: Vec<NamespaceMember>) -> ScriptNode {
    ScriptNode::new(script, vec![TopLevelNode::Namespace(NamespaceNode::new(name, members))])
}

fn source(members: Vec<NamespaceMember>) -> (Build, ScriptId) {
    let mut build = Build::new();
    let main = build.add_script("main.ql", ScriptKind::Source);
    build.add_node(namespace(main, "App", members));
    (build, main)
}

fn il(root: &CompilationRoot, name: &str) -> Vec<String> {
    let method = root
        .methods()
        .iter()
        .find(|m| m.name.to_string() == name)
        .unwrap_or_else(|| panic!("no method {name}"));
    method.inter_lang.iter().map(|i| i.to_string()).collect()
}

fn run_wat<R: wasmtime::WasmResults>(wat: &str, export: &str) -> R {
    let engine = Engine::default();
    let module = Module::new(&engine, wat).unwrap();
    let mut store = Store::new(&engine, ());
    let instance = Instance::new(&mut store, &module, &[]).unwrap();
    let func = instance.get_typed_func::<(), R>(&mut store, export).unwrap();
    func.call(&mut store, ()).unwrap()
}

fn main_with_local() -> (Build, ScriptId) {
    source(vec![method(
        PrimitiveType::I32,
        "Main",
        vec![],
        vec![
            Statement::declare(
                "x",
                PrimitiveType::I32,
                Some(Expression::binary(BinaryOperator::Add, Expression::int(2), Expression::int(3))),
            ),
            Statement::ret(Some(Expression::ident("x"))),
        ],
    )])
}

#[test]
fn round_trip_main_returns_five() {
    let (mut build, _) = main_with_local();
    let root = build.evaluate();
    assert_eq!(il(root, "Main"), ["ldConst.i32 5", "setLocal.0", "getLocal.0", "ret"]);
    assert_eq!(root.global_reference(root.methods()[0].id).to_string(), "App:Main?");

    let asm = build.emit(&Target::nasm()).unwrap();
    assert!(asm.contains("_main:\n            JMP     App@Main?\n"), "{asm}");
    assert!(asm.contains("App@Main?:\n"), "{asm}");
    assert!(asm.contains("MOV     DWORD [EBP - 4], 5\n"), "{asm}");
    assert!(asm.contains("MOV     EAX, DWORD [EBP - 4]\n"), "{asm}");

    let wat = build.emit(&Target::wasm()).unwrap();
    assert!(wat.contains("(export \"memory\" (memory $mem))"), "{wat}");
    assert_eq!(run_wat::<i32>(&wat, "App.Main?"), 5);
}

#[test]
fn locals_and_parameters_are_indexed_by_position() {
    let (mut build, _) = source(vec![method(
        PrimitiveType::I32,
        "Swap",
        vec![ParameterNode::new("a", PrimitiveType::I32), ParameterNode::new("b", PrimitiveType::I32)],
        vec![
            Statement::declare("x", PrimitiveType::I32, Some(Expression::ident("a"))),
            Statement::declare("y", PrimitiveType::I32, Some(Expression::ident("b"))),
            Statement::ret(Some(Expression::ident("y"))),
        ],
    )]);
    assert_eq!(
        il(build.evaluate(), "Swap"),
        ["getLocal.-1", "setLocal.0", "getLocal.-2", "setLocal.1", "getLocal.1", "ret"]
    );
}

#[test]
fn constant_expression_folds_to_one_literal() {
    let (mut build, _) = source(vec![method(
        PrimitiveType::I32,
        "Main",
        vec![],
        vec![Statement::ret(Some(Expression::binary(
            BinaryOperator::Add,
            Expression::int(1),
            Expression::binary(BinaryOperator::Mul, Expression::int(2), Expression::int(3)),
        )))],
    )]);
    assert_eq!(il(build.evaluate(), "Main"), ["ldConst.i32 7", "ret"]);
}

#[test]
fn exact_overload_wins_over_coercion() {
    let mut build = Build::new();
    let header = build.add_script(
        "console.qh",
        ScriptKind::Header {
            assembly: String::new(),
        },
    );
    let main = build.add_script("main.ql", ScriptKind::Source);
    build.add_node(namespace(
        header,
        "Std.Console",
        vec![
            method(PrimitiveType::Void, "Log", vec![ParameterNode::new("s", PrimitiveType::Str)], vec![]),
            method(PrimitiveType::Void, "Log", vec![ParameterNode::new("v", PrimitiveType::I32)], vec![]),
        ],
    ));
    build.add_node(namespace(
        main,
        "App",
        vec![method(
            PrimitiveType::Void,
            "Main",
            vec![],
            vec![Statement::expr(Expression::call("Std.Console.Log", vec![Expression::string("hi")]))],
        )],
    ));

    let root = build.evaluate();
    assert_eq!(il(root, "Main"), ["ldConst.str \"hi\"", "call.static void Std.Console:Log?str"]);
    assert!(!build.scripts().has_errors(), "{}", build.scripts().report());

    let asm = build.emit(&Target::nasm()).unwrap();
    assert!(asm.contains("extern Std.Console@Log?str\n"), "{asm}");
    assert!(!asm.contains("Log?i32"), "{asm}");
}

#[test]
fn missing_method_is_reported_and_siblings_still_lower() {
    let (mut build, main) = source(vec![
        method(PrimitiveType::I32, "Helper", vec![], vec![Statement::ret(Some(Expression::int(1)))]),
        method(
            PrimitiveType::Void,
            "Main",
            vec![],
            vec![Statement::expr(Expression::call("Undefined", vec![]))],
        ),
        method(
            PrimitiveType::I32,
            "Other",
            vec![],
            vec![Statement::ret(Some(Expression::call("Helper", vec![])))],
        ),
    ]);
    let root = build.evaluate();
    assert_eq!(il(root, "Other"), ["call.static i32 App:Helper?", "ret"]);

    let errors = build.scripts().get(main).unwrap().errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        BuildError::Evaluation(EvaluationError::MethodNotFound { name, .. }) if name == "Undefined"
    ));

    let err = build.emit(&Target::wasm()).unwrap_err();
    assert!(matches!(err, BuildFailure::HasErrors(1)));
}

#[test]
fn out_of_range_literal_is_clamped_with_a_warning() {
    let (mut build, main) = source(vec![method(
        PrimitiveType::U8,
        "Main",
        vec![],
        vec![
            Statement::declare("b", PrimitiveType::U8, Some(Expression::int(300))),
            Statement::ret(Some(Expression::ident("b"))),
        ],
    )]);
    assert_eq!(il(build.evaluate(), "Main")[0], "ldConst.u8 255");

    let script = build.scripts().get(main).unwrap();
    assert!(script.errors().is_empty());
    assert!(matches!(
        script.warnings(),
        [BuildError::Evaluation(EvaluationError::NumericOverflow { value: 300, clamped: 255, .. })]
    ));

    let wat = build.emit(&Target::wasm()).unwrap();
    assert_eq!(run_wat::<i32>(&wat, "App.Main?"), 255);
}

#[test]
fn widening_is_one_way() {
    for a in PrimitiveType::NUMERIC {
        for b in PrimitiveType::NUMERIC {
            if a != b {
                assert!(
                    !(a.is_assignable_to(b) && b.is_assignable_to(a)),
                    "{a} and {b} are mutually assignable"
                );
            }
        }
    }

    let (mut build, _) = source(vec![method(
        PrimitiveType::I32,
        "Narrow",
        vec![ParameterNode::new("wide", PrimitiveType::I64)],
        vec![Statement::ret(Some(Expression::ident("wide")))],
    )]);
    build.evaluate();
    let errors: Vec<_> = build.scripts().iter().flat_map(|s| s.errors()).collect();
    assert!(matches!(
        errors.as_slice(),
        [BuildError::Evaluation(EvaluationError::InvalidImplicitCast {
            from: PrimitiveType::I64,
            to: PrimitiveType::I32,
            ..
        })]
    ));
}

#[test]
fn duplicate_overload_is_rejected() {
    let (mut build, main) = source(vec![
        method(PrimitiveType::Void, "Log", vec![ParameterNode::new("v", PrimitiveType::I32)], vec![]),
        method(PrimitiveType::Void, "Log", vec![ParameterNode::new("w", PrimitiveType::I32)], vec![]),
        method(PrimitiveType::Void, "Log", vec![ParameterNode::new("s", PrimitiveType::Str)], vec![]),
    ]);
    let root = build.evaluate();
    assert_eq!(root.methods().len(), 2);
    assert!(matches!(
        build.scripts().get(main).unwrap().errors(),
        [BuildError::Evaluation(EvaluationError::InvalidMethodOverloading { .. })]
    ));
}

#[test]
fn global_references_parse_back() {
    let (mut build, _) = main_with_local();
    let root = build.evaluate();

    let reference: GlobalReference = "App:Main?".parse().unwrap();
    assert_eq!(root.find_method(&reference), Some(root.methods()[0].id));

    let write: GlobalReference = "Std.Console:Write?str_i32".parse().unwrap();
    assert_eq!(write.namespace, ["Std", "Console"]);
    assert_eq!(write.parameters, [PrimitiveType::Str, PrimitiveType::I32]);
    assert_eq!(write.to_string(), "Std.Console:Write?str_i32");
    assert!("NoSeparator".parse::<GlobalReference>().is_err());
}

#[test]
fn loose_methods_get_distinct_implicit_namespaces() {
    let mut build = Build::new();
    for path in ["a.ql", "b.ql"] {
        let script = build.add_script(path, ScriptKind::Source);
        build.add_node(ScriptNode::new(
            script,
            vec![TopLevelNode::Method(MethodDeclarationNode::new(
                PrimitiveType::I32,
                "Value",
                vec![],
                vec![Statement::ret(Some(Expression::int(1)))],
            ))],
        ));
    }
    let root = build.evaluate();
    let names: Vec<_> = root.namespaces().iter().map(|ns| ns.name.clone()).collect();
    assert_eq!(names, [NamespaceName::Implicit(0), NamespaceName::Implicit(1)]);
    assert!(!build.scripts().has_errors(), "{}", build.scripts().report());

    let wat = build.emit(&Target::wasm()).unwrap();
    assert!(wat.contains("(func $__implicit0.Value?"), "{wat}");
    assert!(wat.contains("(func $__implicit1.Value?"), "{wat}");
}

#[test]
fn repeated_parameter_names_block_code_generation() {
    let (mut build, main) = source(vec![method(
        PrimitiveType::I32,
        "F",
        vec![ParameterNode::new("a", PrimitiveType::I32), ParameterNode::new("a", PrimitiveType::I32)],
        vec![Statement::ret(Some(Expression::ident("a")))],
    )]);
    let err = build.emit(&Target::wasm()).unwrap_err();
    assert!(matches!(err, BuildFailure::HasErrors(1)));
    assert!(matches!(
        build.scripts().get(main).unwrap().errors(),
        [BuildError::Evaluation(EvaluationError::DuplicateLocal { .. })]
    ));
}

#[test]
fn an_overload_declared_in_two_scripts_is_rejected() {
    let mut build = Build::new();
    let log = || method(PrimitiveType::Void, "Log", vec![ParameterNode::new("v", PrimitiveType::I32)], vec![]);
    let first = build.add_script("first.ql", ScriptKind::Source);
    let second = build.add_script("second.ql", ScriptKind::Source);
    build.add_node(namespace(first, "App", vec![log()]));
    build.add_node(namespace(second, "App", vec![log()]));

    assert_eq!(build.evaluate().methods().len(), 1);
    assert!(build.scripts().get(first).unwrap().errors().is_empty());
    assert!(matches!(
        build.scripts().get(second).unwrap().errors(),
        [BuildError::Evaluation(EvaluationError::InvalidMethodOverloading { .. })]
    ));
    assert!(matches!(build.emit(&Target::nasm()), Err(BuildFailure::HasErrors(1))));
}

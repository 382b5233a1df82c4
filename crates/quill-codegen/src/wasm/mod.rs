//! WebAssembly text backend.
//!
//! Module layout:
//!
//! ```text
//! (module
//!   (import "<ns.path>" "<method?tags>" (func ...))   ; header methods
//!   (memory $mem 1)
//!   (export "memory" (memory $mem))
//!   (func $<flat> (export "<flat>") ...)             ; compiled methods
//!   (data (i32.const 0) "...")                       ; heap start + strings
//! )
//! ```
//!
//! Local indices are `parameters ++ locals ++ scratch`; IL parameter
//! `-(i+1)` is WASM local `i` and IL local `k` is `parameters + k`.

pub mod data;
pub mod emitter;
pub mod function;

use quill_compiler::{CompilationRoot, GlobalReference};
use quill_core::{CompilingError, PrimitiveType, ScriptTable};
use tracing::debug;

use crate::Backend;
use data::DataSegment;
use emitter::{WatEmitter, quote};
use function::{FunctionContext, compile_function};

pub(crate) const BACKEND: &str = "wasm";

/// WASM value type of a primitive.
///
/// `None` for `void`, generics and the 128-bit integers, which have no
/// WASM value type.
pub fn wasm_type(ty: PrimitiveType) -> Option<&'static str> {
    match ty {
        PrimitiveType::I8
        | PrimitiveType::I16
        | PrimitiveType::I32
        | PrimitiveType::U8
        | PrimitiveType::U16
        | PrimitiveType::U32
        | PrimitiveType::Bool
        | PrimitiveType::Char => Some("i32"),
        PrimitiveType::I64 | PrimitiveType::U64 | PrimitiveType::Str | PrimitiveType::Ptr => Some("i64"),
        PrimitiveType::F32 => Some("f32"),
        PrimitiveType::F64 => Some("f64"),
        PrimitiveType::I128
        | PrimitiveType::U128
        | PrimitiveType::Void
        | PrimitiveType::GenericNumber
        | PrimitiveType::GenericFloating => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WasmOptions {
    /// Initial size of linear memory in 64 KiB pages.
    pub memory_pages: u32,
    pub export_memory: bool,
}

impl Default for WasmOptions {
    fn default() -> Self {
        Self {
            memory_pages: 1,
            export_memory: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WasmBackend {
    options: WasmOptions,
}

impl WasmBackend {
    pub fn new(options: WasmOptions) -> Self {
        Self { options }
    }
}

fn load_string_reference() -> GlobalReference {
    GlobalReference {
        namespace: vec!["Std".into(), "Memory".into()],
        method: vec!["LoadString".into()],
        parameters: vec![PrimitiveType::Str],
    }
}

impl Backend for WasmBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn emit(&self, root: &CompilationRoot, _scripts: &ScriptTable) -> Result<String, CompilingError> {
        let mut emitter = WatEmitter::new();
        emitter.push_line("(module");
        emitter.indent();

        for method in root.methods().iter().filter(|m| m.external) {
            let reference = root.global_reference(method.id);
            let (module, name) = reference.import_path();
            let unsupported = |ty| CompilingError::UnsupportedType {
                backend: BACKEND,
                ty,
                method: reference.to_string(),
            };
            let mut signature = format!("(func ${}", reference.flat_name());
            for p in &method.parameters {
                let ty = wasm_type(p.ty).ok_or_else(|| unsupported(p.ty))?;
                signature.push_str(&format!(" (param {ty})"));
            }
            if method.return_type != PrimitiveType::Void {
                let result = wasm_type(method.return_type).ok_or_else(|| unsupported(method.return_type))?;
                signature.push_str(&format!(" (result {result})"));
            }
            signature.push(')');
            emitter.push_line(format!("(import {} {} {signature})", quote(&module), quote(&name)));
        }

        emitter.push_line(format!("(memory $mem {})", self.options.memory_pages));
        if self.options.export_memory {
            emitter.push_line("(export \"memory\" (memory $mem))");
        }

        let load_string = root
            .find_method(&load_string_reference())
            .filter(|id| root.method(*id).external)
            .map(|id| root.global_reference(id).flat_name());
        let mut data = DataSegment::new();
        let mut context = FunctionContext {
            root,
            data: &mut data,
            load_string,
        };
        for method in root.methods().iter().filter(|m| !m.external) {
            let function = compile_function(method, &mut context)?;
            debug!(function = %function.name, "emitted");
            function.render(&mut emitter);
        }

        emitter.push_line(data.render());
        emitter.dedent();
        emitter.push_line(")");
        Ok(emitter.finish())
    }
}

//! Code generation from lowered IL.
//!
//! Two backends read a finished [`CompilationRoot`]:
//!
//! - [`nasm`]: 32-bit x86 in NASM syntax, driven by a virtual operand stack;
//! - [`wasm`]: WebAssembly text with structured control flow.
//!
//! Both only read the model, so the same root can be emitted for several
//! targets.

pub mod nasm;
pub mod wasm;

use quill_compiler::CompilationRoot;
use quill_core::{CompilingError, ScriptTable};

pub use nasm::{NasmBackend, NasmOptions};
pub use wasm::{WasmBackend, WasmOptions};

/// A code generator for one target.
pub trait Backend {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Render the whole program as target source text.
    ///
    /// `scripts` supplies the assembly of header scripts for targets that
    /// link it in.
    fn emit(&self, root: &CompilationRoot, scripts: &ScriptTable) -> Result<String, CompilingError>;
}

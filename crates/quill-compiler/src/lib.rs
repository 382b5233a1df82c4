//! Semantic evaluation for Quill scripts.
//!
//! Takes the syntax trees of every script in a build and produces a
//! [`CompilationRoot`]: the namespaces and methods of the program, each
//! method lowered to stack IL ready for a backend.
//!
//! ```text
//! ScriptNode[] -> declaration -> resolution -> checking -> lowering -> CompilationRoot
//! ```
//!
//! Diagnostics never abort the pipeline. They are recorded against the
//! owning script in the [`ScriptTable`](quill_core::ScriptTable) and the
//! offending statement is dropped.

pub mod conversion;
pub mod il;
pub mod overload;
pub mod passes;
pub mod program;
pub mod scope;
pub mod typing;

pub use conversion::{Conversion, ConversionKind, common_type, find_conversion};
pub use il::{ConditionKind, IlError, Instruction, IntermediateInstruction};
pub use overload::{OverloadMatch, resolve_overload};
pub use passes::{Evaluator, evaluate};
pub use program::{CompilationRoot, GlobalReference, MethodItem, NamespaceItem, NamespaceName, ParameterItem};

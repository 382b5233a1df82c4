//! Core types shared by the evaluator and the backends.
//!
//! This crate holds the vocabulary of a build, with no compilation logic:
//!
//! - [`span`]: source positions
//! - [`error`]: syntax, evaluation and backend errors
//! - [`script`]: scripts and the diagnostics registry
//! - [`primitive`]: the primitive type system and its coercion rules
//! - [`identifier`]: dotted names
//! - [`ids`]: typed arena indices
//! - [`symbol_hash`]: deterministic signature hashes
//! - [`ast`]: the syntax tree the evaluator consumes

pub mod ast;
pub mod error;
pub mod identifier;
pub mod ids;
pub mod primitive;
pub mod script;
pub mod span;
pub mod symbol_hash;

pub use error::{BuildError, CompilingError, EvaluationError, SyntaxError};
pub use identifier::Identifier;
pub use ids::{MethodId, NamespaceId};
pub use primitive::{PrimitiveKind, PrimitiveType, UnknownPrimitive};
pub use script::{Script, ScriptId, ScriptKind, ScriptTable};
pub use span::Span;
pub use symbol_hash::SymbolHash;

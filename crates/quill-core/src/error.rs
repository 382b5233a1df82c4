//! Error types for every stage of a build.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BuildError (what a script carries in its diagnostics)
//! ├── SyntaxError      - produced by the parser in front of the evaluator
//! ├── EvaluationError  - declaration, resolution, checking and lowering
//! └── CompilingError   - backend failures while emitting target text
//! ```
//!
//! Evaluation errors carry the [`Span`] of the offending node. Compiling
//! errors happen after source positions are gone and name the method or
//! global reference instead.

use thiserror::Error;

use crate::{PrimitiveType, Span};

// ============================================================================
// Syntax Errors
// ============================================================================

/// Errors raised while turning source text into a `ScriptNode`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("unexpected token '{found}' at {span}")]
    UnexpectedToken { found: String, span: Span },

    #[error("unexpected end of file at {span}")]
    UnexpectedEof { span: Span },
}

// ============================================================================
// Evaluation Errors
// ============================================================================

/// Errors raised by the evaluator passes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("at {span}: no method named '{name}'")]
    MethodNotFound { name: String, span: Span },

    #[error("at {span}: no overload of '{name}' accepts ({arguments})")]
    MethodOverloadNotFound {
        name: String,
        arguments: String,
        span: Span,
    },

    #[error("at {span}: unknown local variable '{name}'")]
    LocalVariableNotFound { name: String, span: Span },

    #[error("at {span}: cannot implicitly convert '{from}' to '{to}'")]
    InvalidImplicitCast {
        from: PrimitiveType,
        to: PrimitiveType,
        span: Span,
    },

    #[error("at {span}: '{signature}' is already declared in '{namespace}'")]
    InvalidMethodOverloading {
        namespace: String,
        signature: String,
        span: Span,
    },

    #[error("at {span}: {construct} is not supported")]
    InstructionNotImplemented { construct: String, span: Span },

    /// Reported as a warning: the literal is clamped and compilation goes on.
    #[error("at {span}: {value} does not fit in '{target}', clamped to {clamped}")]
    NumericOverflow {
        value: i128,
        target: PrimitiveType,
        clamped: i128,
        span: Span,
    },

    #[error("at {span}: '{left}' and '{right}' have no common type")]
    NoCommonType {
        left: PrimitiveType,
        right: PrimitiveType,
        span: Span,
    },

    #[error("at {span}: '{name}' cannot be declared with type '{ty}'")]
    InvalidDeclarationType {
        name: String,
        ty: PrimitiveType,
        span: Span,
    },

    #[error("at {span}: '{method}' returns '{expected}' but the statement returns '{found}'")]
    InvalidReturn {
        method: String,
        expected: PrimitiveType,
        found: PrimitiveType,
        span: Span,
    },

    #[error("at {span}: condition must be 'bool', found '{found}'")]
    InvalidCondition { found: PrimitiveType, span: Span },

    #[error("at {span}: '{name}' is already declared in this scope")]
    DuplicateLocal { name: String, span: Span },
}

impl EvaluationError {
    pub fn span(&self) -> Span {
        match self {
            EvaluationError::MethodNotFound { span, .. }
            | EvaluationError::MethodOverloadNotFound { span, .. }
            | EvaluationError::LocalVariableNotFound { span, .. }
            | EvaluationError::InvalidImplicitCast { span, .. }
            | EvaluationError::InvalidMethodOverloading { span, .. }
            | EvaluationError::InstructionNotImplemented { span, .. }
            | EvaluationError::NumericOverflow { span, .. }
            | EvaluationError::NoCommonType { span, .. }
            | EvaluationError::InvalidDeclarationType { span, .. }
            | EvaluationError::InvalidReturn { span, .. }
            | EvaluationError::InvalidCondition { span, .. }
            | EvaluationError::DuplicateLocal { span, .. } => *span,
        }
    }
}

// ============================================================================
// Compiling Errors
// ============================================================================

/// Errors raised by a backend while turning IL into target text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilingError {
    #[error("call to unknown method '{reference}'")]
    UnknownCallTarget { reference: String },

    #[error("{backend}: type '{ty}' is not supported (in '{method}')")]
    UnsupportedType {
        backend: &'static str,
        ty: PrimitiveType,
        method: String,
    },

    #[error("{backend}: no conversion from '{from}' to '{to}'")]
    UnsupportedConversion {
        backend: &'static str,
        from: PrimitiveType,
        to: PrimitiveType,
    },

    #[error("'{instruction}' in '{method}' needs more values than are on the stack")]
    StackUnderflow { method: String, instruction: String },

    #[error("unbalanced if/else/endif in '{method}'")]
    UnbalancedConditional { method: String },

    #[error("jump in '{method}' targets instruction {target}, which does not exist")]
    UnresolvedJump { method: String, target: i64 },

    #[error("{backend}: unstructured jump in '{method}'")]
    UnstructuredJump { backend: &'static str, method: String },

    #[error("malformed instruction '{instruction}': {detail}")]
    MalformedInstruction { instruction: String, detail: String },

    #[error("'{reference}' must be declared by a header script")]
    MissingImport { reference: String },
}

// ============================================================================
// Build Error
// ============================================================================

/// Any diagnostic attached to a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Compiling(#[from] CompilingError),
}

impl BuildError {
    /// Source position, when the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            BuildError::Syntax(SyntaxError::UnexpectedToken { span, .. })
            | BuildError::Syntax(SyntaxError::UnexpectedEof { span }) => Some(*span),
            BuildError::Evaluation(e) => Some(e.span()),
            BuildError::Compiling(_) => None,
        }
    }
}

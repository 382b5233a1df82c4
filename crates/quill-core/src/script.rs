//! Scripts and their diagnostics.
//!
//! A build is made of scripts of three kinds:
//!
//! - **Source** scripts hold user code that is lowered and emitted.
//! - **Header** scripts declare methods implemented elsewhere. They carry
//!   the assembly text that implements them for the register backend.
//! - **Library** scripts are prebuilt and only contribute declarations.
//!
//! Every diagnostic raised during a build is attached to the script it
//! concerns. [`ScriptTable`] is the registry that answers "did anything
//! fail?" before a backend is allowed to run.

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use crate::BuildError;

/// Index of a script in its [`ScriptTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    Source,
    /// Declarations backed by hand-written NASM in `assembly`.
    Header { assembly: String },
    Library,
}

#[derive(Debug, Clone)]
pub struct Script {
    id: ScriptId,
    path: PathBuf,
    kind: ScriptKind,
    errors: Vec<BuildError>,
    warnings: Vec<BuildError>,
}

impl Script {
    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &ScriptKind {
        &self.kind
    }

    pub fn is_header(&self) -> bool {
        matches!(self.kind, ScriptKind::Header { .. })
    }

    /// Assembly text of a header script.
    pub fn assembly(&self) -> Option<&str> {
        match &self.kind {
            ScriptKind::Header { assembly } => Some(assembly),
            _ => None,
        }
    }

    /// Read the script's source text from disk.
    pub fn read(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.path)
    }

    pub fn errors(&self) -> &[BuildError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[BuildError] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Owns every script of a build and the diagnostics raised against them.
#[derive(Debug, Default)]
pub struct ScriptTable {
    scripts: Vec<Script>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, kind: ScriptKind) -> ScriptId {
        let id = ScriptId(self.scripts.len() as u32);
        self.scripts.push(Script {
            id,
            path: path.into(),
            kind,
            errors: Vec::new(),
            warnings: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ScriptId) -> Option<&Script> {
        self.scripts.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Whether `id` names a header script.
    pub fn is_header(&self, id: ScriptId) -> bool {
        self.get(id).is_some_and(Script::is_header)
    }

    /// Attach an error to a script. Unknown ids are ignored.
    pub fn throw_error(&mut self, id: ScriptId, error: impl Into<BuildError>) {
        if let Some(script) = self.scripts.get_mut(id.0 as usize) {
            script.errors.push(error.into());
        }
    }

    /// Attach a warning to a script. Unknown ids are ignored.
    pub fn throw_warning(&mut self, id: ScriptId, warning: impl Into<BuildError>) {
        if let Some(script) = self.scripts.get_mut(id.0 as usize) {
            script.warnings.push(warning.into());
        }
    }

    /// Drop everything but syntax diagnostics, ahead of a fresh evaluation.
    pub fn clear_evaluation(&mut self) {
        for script in &mut self.scripts {
            script.errors.retain(|e| matches!(e, BuildError::Syntax(_)));
            script.warnings.retain(|e| matches!(e, BuildError::Syntax(_)));
        }
    }

    pub fn has_errors(&self) -> bool {
        self.scripts.iter().any(Script::has_errors)
    }

    pub fn scripts_with_errors(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| !s.errors.is_empty())
    }

    pub fn scripts_with_warnings(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter().filter(|s| !s.warnings.is_empty())
    }

    pub fn error_count(&self) -> usize {
        self.scripts.iter().map(|s| s.errors.len()).sum()
    }

    /// Human readable summary of every diagnostic, grouped by script.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for script in self.scripts.iter() {
            if script.errors.is_empty() && script.warnings.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}:", script.path.display());
            for error in &script.errors {
                let _ = writeln!(out, "  error: {error}");
            }
            for warning in &script.warnings {
                let _ = writeln!(out, "  warning: {warning}");
            }
        }
        out
    }
}

//! Local name scopes for resolution.
//!
//! `LocalScope` maps names to [`LocalRef`]s while a method body is being
//! resolved. Storage is not allocated here: the method owns its slots and
//! hands out indices, the scope only decides which name is visible.
//!
//! - Parameters and top-level locals share depth 0.
//! - Each block opens a deeper scope; names declared there disappear when
//!   it closes and shadowed outer names come back.
//! - Slots are never reused, so a closed block's locals keep their index.

use quill_core::ast::LocalRef;
use quill_core::{EvaluationError, PrimitiveType, Span};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct LocalVar {
    local: LocalRef,
    depth: u32,
}

#[derive(Debug, Default)]
pub struct LocalScope {
    variables: FxHashMap<String, LocalVar>,
    depth: u32,
    /// `(depth at which the shadowing happened, name, previous binding)`
    shadowed: Vec<(u32, String, LocalVar)>,
}

impl LocalScope {
    /// Scope with the method's parameters visible.
    pub fn with_parameters<'a>(parameters: impl IntoIterator<Item = (&'a str, PrimitiveType)>) -> Self {
        let mut scope = Self::default();
        for (position, (name, ty)) in parameters.into_iter().enumerate() {
            scope.variables.insert(
                name.to_string(),
                LocalVar {
                    local: LocalRef::parameter(position, ty),
                    depth: 0,
                },
            );
        }
        scope
    }

    pub fn push_scope(&mut self) {
        self.depth += 1;
    }

    pub fn pop_scope(&mut self) {
        let depth = self.depth;
        self.variables.retain(|_, var| var.depth < depth);
        while let Some((shadow_depth, _, _)) = self.shadowed.last() {
            if *shadow_depth < depth {
                break;
            }
            if let Some((_, name, var)) = self.shadowed.pop() {
                self.variables.insert(name, var);
            }
        }
        self.depth = depth.saturating_sub(1);
    }

    /// Make `name` refer to `local` from here to the end of the current scope.
    pub fn declare(&mut self, name: &str, local: LocalRef, span: Span) -> Result<(), EvaluationError> {
        let var = LocalVar {
            local,
            depth: self.depth,
        };
        match self.variables.insert(name.to_string(), var) {
            Some(previous) if previous.depth == self.depth => {
                self.variables.insert(name.to_string(), previous);
                Err(EvaluationError::DuplicateLocal {
                    name: name.to_string(),
                    span,
                })
            }
            Some(previous) => {
                self.shadowed.push((self.depth, name.to_string(), previous));
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<LocalRef> {
        self.variables.get(name).map(|var| var.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_visible_with_negative_indices() {
        let scope = LocalScope::with_parameters([("a", PrimitiveType::I32), ("b", PrimitiveType::Str)]);
        assert_eq!(scope.lookup("a").map(|l| l.index), Some(-1));
        assert_eq!(scope.lookup("b").map(|l| l.index), Some(-2));
        assert_eq!(scope.lookup("c"), None);
    }

    #[test]
    fn redeclaring_in_same_scope_fails() {
        let mut scope = LocalScope::with_parameters([("a", PrimitiveType::I32)]);
        let err = scope.declare("a", LocalRef::local(0, PrimitiveType::I32), Span::default());
        assert!(matches!(err, Err(EvaluationError::DuplicateLocal { .. })));
        assert_eq!(scope.lookup("a").map(|l| l.index), Some(-1));
    }

    #[test]
    fn block_shadowing_is_undone_on_exit() {
        let mut scope = LocalScope::default();
        scope.declare("x", LocalRef::local(0, PrimitiveType::I32), Span::default()).unwrap();

        scope.push_scope();
        scope.declare("x", LocalRef::local(1, PrimitiveType::U8), Span::default()).unwrap();
        scope.declare("y", LocalRef::local(2, PrimitiveType::U8), Span::default()).unwrap();
        assert_eq!(scope.lookup("x").map(|l| l.index), Some(1));
        scope.pop_scope();

        assert_eq!(scope.lookup("x").map(|l| l.index), Some(0));
        assert_eq!(scope.lookup("y"), None);
    }
}

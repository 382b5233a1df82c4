//! Typed indices into the program model arenas.
//!
//! Items refer to each other through these ids instead of pointers, so a
//! method knows its namespace by `NamespaceId` and a resolved call knows
//! its target by `MethodId`.

use std::fmt;

/// Index of a namespace in `CompilationRoot::namespaces`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub u32);

/// Index of a method in `CompilationRoot::methods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

impl NamespaceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl MethodId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns#{}", self.0)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

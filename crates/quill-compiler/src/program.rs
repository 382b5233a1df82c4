//! The program model.
//!
//! [`CompilationRoot`] owns every namespace and method of a build in two
//! arenas. Items point at each other through [`NamespaceId`] and
//! [`MethodId`]; nothing holds a reference into the arenas, so passes can
//! freely take `&mut CompilationRoot`.
//!
//! A method moves through the passes like this:
//!
//! ```text
//! declared ──► code_statements (folded AST)
//!          ──► code_statements (resolved + checked, new lists)
//!          ──► inter_lang (IL), code_statements emptied, compiled = true
//! ```

use std::fmt;
use std::str::FromStr;

use quill_core::ast::Statement;
use quill_core::{Identifier, MethodId, NamespaceId, PrimitiveType, ScriptId, Span, SymbolHash};
use rustc_hash::FxHashMap;

use crate::il::IntermediateInstruction;

// ============================================================================
// Namespaces
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceName {
    Explicit(Identifier),
    /// Synthetic namespace for methods declared outside any `namespace`.
    Implicit(u32),
}

impl NamespaceName {
    /// Path segments used in global references.
    pub fn segments(&self) -> Vec<String> {
        match self {
            NamespaceName::Explicit(id) => id.segments().to_vec(),
            NamespaceName::Implicit(tag) => vec![format!("__implicit{tag}")],
        }
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("."))
    }
}

#[derive(Debug, Clone)]
pub struct FieldItem {
    pub name: String,
    pub ty: PrimitiveType,
}

#[derive(Debug, Clone)]
pub struct NamespaceItem {
    pub id: NamespaceId,
    pub name: NamespaceName,
    pub script: ScriptId,
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldItem>,
}

impl NamespaceItem {
    pub fn path_hash(&self) -> SymbolHash {
        SymbolHash::from_path(self.name.segments().as_slice())
    }
}

// ============================================================================
// Methods
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterItem {
    pub name: String,
    pub ty: PrimitiveType,
}

#[derive(Debug, Clone)]
pub struct MethodItem {
    pub id: MethodId,
    pub namespace: NamespaceId,
    pub script: ScriptId,
    pub name: Identifier,
    pub return_type: PrimitiveType,
    pub parameters: Vec<ParameterItem>,
    pub code_statements: Vec<Statement>,
    /// Types of locals, indexed by local slot.
    pub local_data: Vec<PrimitiveType>,
    pub inter_lang: Vec<IntermediateInstruction>,
    pub compiled: bool,
    /// Declared by a header script; implemented outside the build.
    pub external: bool,
    pub span: Span,
}

impl MethodItem {
    pub fn parameter_types(&self) -> Vec<PrimitiveType> {
        self.parameters.iter().map(|p| p.ty).collect()
    }

    /// Total byte size of locals.
    pub fn local_memory_size(&self) -> u32 {
        self.local_data.iter().map(|ty| ty.size()).sum()
    }

    /// Total byte size of parameters.
    pub fn parameters_memory_size(&self) -> u32 {
        self.parameters.iter().map(|p| p.ty.size()).sum()
    }

    /// Reserve the next local slot.
    pub fn alloc(&mut self, ty: PrimitiveType) -> i32 {
        self.local_data.push(ty);
        (self.local_data.len() - 1) as i32
    }

    pub fn emit(&mut self, instruction: IntermediateInstruction) {
        self.inter_lang.push(instruction);
    }

    /// Move the pending statements out, leaving the list empty.
    pub fn take_statements(&mut self) -> Vec<Statement> {
        std::mem::take(&mut self.code_statements)
    }

    /// Type stored at an IL local index (negative for parameters).
    pub fn local_type(&self, index: i32) -> Option<PrimitiveType> {
        if index < 0 {
            self.parameters.get((-index - 1) as usize).map(|p| p.ty)
        } else {
            self.local_data.get(index as usize).copied()
        }
    }

    /// `name(i32, str) -> void`
    pub fn signature(&self) -> String {
        let params: Vec<_> = self.parameters.iter().map(|p| p.ty.tag()).collect();
        format!("{}({}) -> {}", self.name, params.join(", "), self.return_type)
    }
}

// ============================================================================
// Global references
// ============================================================================

/// Fully qualified name of a method overload.
///
/// Rendered as `<ns.path>:<method.path>?<tag>_<tag>`, for example
/// `Std.Console:Write?str` or `App:Main?`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalReference {
    pub namespace: Vec<String>,
    pub method: Vec<String>,
    pub parameters: Vec<PrimitiveType>,
}

impl GlobalReference {
    fn tags(&self) -> String {
        let tags: Vec<_> = self.parameters.iter().map(|p| p.tag()).collect();
        tags.join("_")
    }

    /// NASM label: the `:` separator becomes `@`.
    pub fn asm_label(&self) -> String {
        format!("{}@{}?{}", self.namespace.join("."), self.method.join("."), self.tags())
    }

    /// Single dotted name, used for WASM function identifiers and exports.
    pub fn flat_name(&self) -> String {
        format!("{}.{}?{}", self.namespace.join("."), self.method.join("."), self.tags())
    }

    /// `(module, name)` pair for a WASM import.
    pub fn import_path(&self) -> (String, String) {
        (
            self.namespace.join("."),
            format!("{}?{}", self.method.join("."), self.tags()),
        )
    }
}

impl fmt::Display for GlobalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}?{}", self.namespace.join("."), self.method.join("."), self.tags())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed global reference '{0}'")]
pub struct MalformedReference(pub String);

impl FromStr for GlobalReference {
    type Err = MalformedReference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedReference(s.to_string());
        let (namespace, rest) = s.split_once(':').ok_or_else(malformed)?;
        let (method, tags) = rest.split_once('?').ok_or_else(malformed)?;
        if namespace.is_empty() || method.is_empty() {
            return Err(malformed());
        }
        let parameters = if tags.is_empty() {
            Vec::new()
        } else {
            tags.split('_')
                .map(|t| t.parse::<PrimitiveType>().map_err(|_| malformed()))
                .collect::<Result<_, _>>()?
        };
        Ok(GlobalReference {
            namespace: namespace.split('.').map(str::to_string).collect(),
            method: method.split('.').map(str::to_string).collect(),
            parameters,
        })
    }
}

// ============================================================================
// CompilationRoot
// ============================================================================

/// Returned when a signature is declared twice under one namespace path,
/// in the same script or in different ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSignature;

/// Every namespace and method of a build.
#[derive(Debug, Default)]
pub struct CompilationRoot {
    namespaces: Vec<NamespaceItem>,
    methods: Vec<MethodItem>,
    scripts: Vec<ScriptId>,
    next_implicit: u32,
    /// Declared methods by signature hash, across every namespace.
    signatures: FxHashMap<SymbolHash, Vec<MethodId>>,
}

impl CompilationRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespaces(&self) -> &[NamespaceItem] {
        &self.namespaces
    }

    pub fn methods(&self) -> &[MethodItem] {
        &self.methods
    }

    /// Scripts that contributed at least one namespace, in first-seen order.
    pub fn scripts(&self) -> &[ScriptId] {
        &self.scripts
    }

    pub fn namespace(&self, id: NamespaceId) -> &NamespaceItem {
        &self.namespaces[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodItem {
        &self.methods[id.index()]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodItem {
        &mut self.methods[id.index()]
    }

    pub fn method_ids(&self) -> impl Iterator<Item = MethodId> + use<> {
        (0..self.methods.len() as u32).map(MethodId)
    }

    fn note_script(&mut self, script: ScriptId) {
        if !self.scripts.contains(&script) {
            self.scripts.push(script);
        }
    }

    /// Add a namespace. Explicit namespaces with the same path in the same
    /// script are merged.
    pub fn add_namespace(&mut self, name: Identifier, script: ScriptId) -> NamespaceId {
        if let Some(existing) = self.namespaces.iter().find(|ns| {
            ns.script == script && matches!(&ns.name, NamespaceName::Explicit(n) if *n == name)
        }) {
            return existing.id;
        }
        self.push_namespace(NamespaceName::Explicit(name), script)
    }

    /// Create the anonymous namespace of a script, or return it if it exists.
    pub fn implicit_namespace(&mut self, script: ScriptId) -> NamespaceId {
        if let Some(existing) = self
            .namespaces
            .iter()
            .find(|ns| ns.script == script && matches!(ns.name, NamespaceName::Implicit(_)))
        {
            return existing.id;
        }
        let tag = self.next_implicit;
        self.next_implicit += 1;
        self.push_namespace(NamespaceName::Implicit(tag), script)
    }

    fn push_namespace(&mut self, name: NamespaceName, script: ScriptId) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len() as u32);
        self.namespaces.push(NamespaceItem {
            id,
            name,
            script,
            methods: Vec::new(),
            fields: Vec::new(),
        });
        self.note_script(script);
        id
    }

    pub fn add_field(&mut self, namespace: NamespaceId, field: FieldItem) {
        self.namespaces[namespace.index()].fields.push(field);
    }

    /// Register a method in its namespace.
    ///
    /// Fails without registering anything when a namespace with the same
    /// path, from any script, already has a method with the same name and
    /// parameter types. A hash hit is confirmed against the declared method
    /// before it counts as a duplicate.
    pub fn add_method(
        &mut self,
        namespace: NamespaceId,
        name: Identifier,
        return_type: PrimitiveType,
        parameters: Vec<ParameterItem>,
        external: bool,
        span: Span,
    ) -> Result<MethodId, DuplicateSignature> {
        let param_types: Vec<_> = parameters.iter().map(|p| p.ty).collect();
        let path = self.namespace(namespace).name.segments();
        let hash = SymbolHash::from_method(self.namespace(namespace).path_hash(), name.segments(), &param_types);
        let duplicate = self.signatures.get(&hash).is_some_and(|ids| {
            ids.iter().any(|id| {
                let existing = self.method(*id);
                existing.name == name
                    && existing.parameter_types() == param_types
                    && self.namespace(existing.namespace).name.segments() == path
            })
        });
        if duplicate {
            return Err(DuplicateSignature);
        }

        let id = MethodId(self.methods.len() as u32);
        self.signatures.entry(hash).or_default().push(id);
        let ns = &mut self.namespaces[namespace.index()];
        ns.methods.push(id);
        let script = ns.script;
        self.methods.push(MethodItem {
            id,
            namespace,
            script,
            name,
            return_type,
            parameters,
            code_statements: Vec::new(),
            local_data: Vec::new(),
            inter_lang: Vec::new(),
            compiled: false,
            external,
            span,
        });
        Ok(id)
    }

    /// First explicit namespace with exactly this path.
    pub fn find_namespace(&self, path: &Identifier) -> Option<NamespaceId> {
        self.namespaces
            .iter()
            .find(|ns| matches!(&ns.name, NamespaceName::Explicit(n) if n == path))
            .map(|ns| ns.id)
    }

    /// Methods of `namespace` named `name`, in declaration order.
    pub fn methods_named(&self, namespace: NamespaceId, name: &Identifier) -> Vec<MethodId> {
        self.namespace(namespace)
            .methods
            .iter()
            .copied()
            .filter(|id| self.method(*id).name == *name)
            .collect()
    }

    /// Candidate overloads for a call written in `enclosing`.
    ///
    /// A simple name is looked up in the enclosing namespace first. Failing
    /// that, the name is split into an explicit namespace path and a method
    /// name; every namespace declaring that path is searched, and the first
    /// one with matches wins.
    pub fn find_overloads(&self, name: &Identifier, enclosing: NamespaceId) -> Vec<MethodId> {
        if name.is_simple() {
            let local = self.methods_named(enclosing, name);
            if !local.is_empty() {
                return local;
            }
        }
        for ns in &self.namespaces {
            let NamespaceName::Explicit(path) = &ns.name else {
                continue;
            };
            if let Some(rest) = name.strip_prefix(path) {
                let found = self.methods_named(ns.id, &rest);
                if !found.is_empty() {
                    return found;
                }
            }
        }
        Vec::new()
    }

    /// Global reference of a method, computed from the model.
    pub fn global_reference(&self, id: MethodId) -> GlobalReference {
        let method = self.method(id);
        GlobalReference {
            namespace: self.namespace(method.namespace).name.segments(),
            method: method.name.segments().to_vec(),
            parameters: method.parameter_types(),
        }
    }

    /// Method with exactly this global reference.
    pub fn find_method(&self, reference: &GlobalReference) -> Option<MethodId> {
        self.namespaces
            .iter()
            .filter(|ns| ns.name.segments() == reference.namespace)
            .flat_map(|ns| ns.methods.iter().copied())
            .find(|id| {
                let m = self.method(*id);
                m.name.segments() == reference.method.as_slice()
                    && m.parameters.iter().map(|p| p.ty).eq(reference.parameters.iter().copied())
            })
    }
}

impl fmt::Display for CompilationRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ns in &self.namespaces {
            writeln!(f, "namespace {} (script {})", ns.name, ns.script.0)?;
            for field in &ns.fields {
                writeln!(f, "  field {} {}", field.ty, field.name)?;
            }
            for id in &ns.methods {
                let method = self.method(*id);
                let marker = if method.external { " extern" } else { "" };
                writeln!(
                    f,
                    "  {}{} [locals {}B, params {}B]",
                    method.signature(),
                    marker,
                    method.local_memory_size(),
                    method.parameters_memory_size()
                )?;
                if method.compiled {
                    for instr in &method.inter_lang {
                        writeln!(f, "    {instr}")?;
                    }
                } else {
                    for stmt in &method.code_statements {
                        writeln!(f, "    {stmt}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

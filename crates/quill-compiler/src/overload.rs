//! Overload resolution for method calls.
//!
//! ## Algorithm
//!
//! 1. Drop candidates whose arity differs from the call.
//! 2. Score each remaining candidate: the sum of the conversion costs of
//!    its arguments, or no score if some argument does not convert.
//! 3. The exact pass accepts only identity conversions. If it finds
//!    nothing, the coercible pass accepts any implicit conversion.
//! 4. The lowest total cost wins; ties go to the earliest declaration.

use quill_core::{MethodId, PrimitiveType};

use crate::conversion::{Conversion, find_conversion};
use crate::program::CompilationRoot;

/// The chosen overload and the conversion applied to each argument.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadMatch {
    pub method: MethodId,
    pub arg_conversions: Vec<Conversion>,
    pub total_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    Exact,
    Coercible,
}

/// Pick an overload whose parameter types equal the argument types.
pub fn resolve_exact(
    root: &CompilationRoot,
    candidates: &[MethodId],
    arg_types: &[PrimitiveType],
) -> Option<OverloadMatch> {
    best_candidate(root, candidates, arg_types, MatchMode::Exact)
}

/// Pick the cheapest overload reachable through implicit conversions.
pub fn resolve_coercible(
    root: &CompilationRoot,
    candidates: &[MethodId],
    arg_types: &[PrimitiveType],
) -> Option<OverloadMatch> {
    best_candidate(root, candidates, arg_types, MatchMode::Coercible)
}

/// Exact pass first, then the coercible pass.
pub fn resolve_overload(
    root: &CompilationRoot,
    candidates: &[MethodId],
    arg_types: &[PrimitiveType],
) -> Option<OverloadMatch> {
    resolve_exact(root, candidates, arg_types)
        .or_else(|| resolve_coercible(root, candidates, arg_types))
}

fn best_candidate(
    root: &CompilationRoot,
    candidates: &[MethodId],
    arg_types: &[PrimitiveType],
    mode: MatchMode,
) -> Option<OverloadMatch> {
    let mut best: Option<OverloadMatch> = None;
    for &method in candidates {
        let Some(candidate) = score(root, method, arg_types, mode) else {
            continue;
        };
        if best.as_ref().is_none_or(|b| candidate.total_cost < b.total_cost) {
            best = Some(candidate);
        }
    }
    best
}

fn score(
    root: &CompilationRoot,
    method: MethodId,
    arg_types: &[PrimitiveType],
    mode: MatchMode,
) -> Option<OverloadMatch> {
    let params = &root.method(method).parameters;
    if params.len() != arg_types.len() {
        return None;
    }
    let mut arg_conversions = Vec::with_capacity(params.len());
    for (param, &arg) in params.iter().zip(arg_types) {
        let conversion = find_conversion(arg, param.ty)?;
        if mode == MatchMode::Exact && !conversion.is_exact() {
            return None;
        }
        arg_conversions.push(conversion);
    }
    let total_cost = arg_conversions.iter().map(|c| c.cost).sum();
    Some(OverloadMatch {
        method,
        arg_conversions,
        total_cost,
    })
}

//! Deterministic signature hashing.
//!
//! A [`SymbolHash`] identifies a method overload by its owner path, name
//! and parameter types. Two declarations with the same hash collide, which
//! is how duplicate overloads are detected before any lowering happens.
//!
//! Hashes are XXH64 with a domain constant per kind of input, and a
//! per-position marker so that `(i32, str)` and `(str, i32)` differ.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

use crate::PrimitiveType;

/// Mixing constants.
pub mod hash_constants {
    /// Separator folded in between path segments and parameters.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for namespace paths.
    pub const NAMESPACE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for method signatures.
    pub const METHOD: u64 = 0x5ea77ffbcdf5f302;

    /// Position markers for the first parameters; later ones are derived.
    pub const PARAM_MARKERS: [u64; 8] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
    ];
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolHash(pub u64);

impl SymbolHash {
    /// Hash of a namespace path given as its segments.
    pub fn from_path<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut hash = hash_constants::NAMESPACE;
        for segment in segments {
            hash = hash
                .wrapping_mul(hash_constants::SEP)
                .wrapping_add(xxh64(segment.as_ref().as_bytes(), 0));
        }
        SymbolHash(hash)
    }

    /// Hash of a method signature inside `owner`.
    ///
    /// The return type is not part of the signature.
    pub fn from_method<S: AsRef<str>>(
        owner: SymbolHash,
        name: &[S],
        parameters: &[PrimitiveType],
    ) -> Self {
        let mut hash = hash_constants::METHOD ^ owner.0;
        for segment in name {
            hash = hash
                .wrapping_mul(hash_constants::SEP)
                .wrapping_add(xxh64(segment.as_ref().as_bytes(), 0));
        }
        for (i, param) in parameters.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            let tag = xxh64(param.tag().as_bytes(), 0);
            hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ tag);
        }
        SymbolHash(hash)
    }
}

impl fmt::Debug for SymbolHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolHash({:#018x})", self.0)
    }
}

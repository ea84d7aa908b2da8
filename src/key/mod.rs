//! Key Module
//!
//! Query key types and the canonicalizer that maps them to cache keys.

mod canonical;
mod part;

pub use canonical::{
    canonicalize, match_target, matches_target, try_canonicalize, KeyError, CIRCULAR_MARKER,
};
pub use part::{KeyPart, QueryKey, SharedKey};

// == Public Constants ==
/// Deepest nesting the canonicalizer will descend before giving up
pub const MAX_KEY_DEPTH: usize = 128;

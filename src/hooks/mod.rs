//! Hooks Module
//!
//! Scoped handles binding queries and mutations to a consumer's lifetime.

mod use_mutation;
mod use_query;

pub use use_mutation::{MutationState, MutationStatus, UseMutation};
pub use use_query::{QueryOptions, UseQuery};

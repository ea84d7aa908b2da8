//! Query Module
//!
//! Fetch coordination: deduplication, cancellation, invalidation and
//! subscriber notification on top of the cache store.

mod abort;
mod client;
mod focus;
mod inflight;
mod mutation;
mod subscription;

pub use abort::{AbortController, AbortSignal};
pub use client::{query_fn, QueryClient, QueryFn};
pub use focus::FocusManager;
pub use inflight::{InFlight, InFlightRegistry, SharedOutcome};
pub use mutation::{MutationExecutor, MutationFn, MutationOptions};
pub use subscription::{notify, Listener, Subscription, SubscriptionRegistry};

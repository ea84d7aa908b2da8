//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Query GC: Removes idle, unobserved queries at configured intervals

mod gc;

pub use gc::{spawn_gc_task, spawn_gc_task_every};

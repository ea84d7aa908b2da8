//! API Module
//!
//! HTTP handlers and routing for the query cache gateway.
//!
//! # Endpoints
//! - `POST /fetch` - Read-through fetch with deduplication
//! - `GET /query?key=` - Inspect a cached query
//! - `PUT /query` - Write query data
//! - `DELETE /query?key=` - Remove matching queries
//! - `POST /invalidate` - Invalidate matching queries
//! - `POST /focus` - Emit a focus event
//! - `GET /stats` - Get coordinator statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;
pub mod upstream;

pub use handlers::*;
pub use routes::create_router;
pub use upstream::UpstreamClient;

//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! The only API route is `POST /api/upload`; everything else is served from the public
//! directory by the static file fallback.

pub mod handlers;
pub mod models;

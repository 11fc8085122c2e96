//! HTTP request handlers.
//!
//! - [`uploads`]: profile photo upload
//!
//! Handlers return [`crate::errors::Error`], which converts to a JSON `{ "error": ... }` body
//! with the matching status code.

pub mod uploads;

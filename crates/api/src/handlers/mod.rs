//! Request handlers.
//!
//! Handlers extract and parse requests, delegate to the annotation engine
//! in [`AppState`](crate::state::AppState) and map errors via
//! [`AppError`](crate::error::AppError).

pub mod annotation;

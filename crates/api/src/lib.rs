//! HTTP API: routing, organizer scoping, and request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;

//! HTTP API: routing, actor context and request/response mapping over the engine.

pub mod app;
pub mod context;
pub mod middleware;

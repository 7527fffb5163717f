//! Tile generation service.
//!
//! [`GenerationService`] turns a request into an encoded tile mesh;
//! [`GenerationServer`] exposes it over HTTP.

pub mod http;
pub mod service;

pub use http::{GenerationServer, ServerError};
pub use service::{GenerationService, ServiceError};

//! Provider-facing behavior: error classification strategies and Graph API reads.
//!
//! `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook that maps token endpoint
//! and Graph API failures into the service error taxonomy. `graph` reads leads, forms, and pages
//! with the stored access token.

pub mod graph;
pub mod strategy;

pub use graph::*;
pub use strategy::*;

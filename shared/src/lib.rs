//! LearnLoop Shared Library
//!
//! This crate contains shared types and validation used by the backend
//! and by API clients.

pub mod errors;
pub mod types;
pub mod validation;

// Re-export commonly used items
pub use errors::*;
pub use types::*;

//! Business logic services
//!
//! Services encapsulate business logic and coordinate between
//! repositories and external systems.

pub mod auth;
pub mod google;

pub use auth::{AuthService, Session};
pub use google::{GoogleCredential, GoogleProfile, GoogleVerifier};

//! Database repositories
//!
//! Provides data access layer for account persistence.

pub mod user;

pub use user::{InMemoryUserStore, NewUser, PgUserStore, RepositoryError, UserRecord, UserStore};

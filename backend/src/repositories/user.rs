//! User store for account persistence
//!
//! `UserStore` is the seam between the auth flows and wherever accounts
//! live. `PgUserStore` is the production store; `InMemoryUserStore` backs
//! development mock mode and the test suite.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence failures the auth flows distinguish
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("An account with this email already exists")]
    DuplicateEmail,

    #[error("This Google account is linked to another user")]
    DuplicateGoogleAccount,

    #[error("User {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Stored account
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Absent for accounts created through Google sign-in
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    /// Already normalized by the caller
    pub email: String,
    pub password_hash: Option<String>,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError>;

    /// Fails with `DuplicateEmail` when the email is taken and with
    /// `DuplicateGoogleAccount` when the Google id is
    async fn create(&self, user: NewUser) -> Result<UserRecord, RepositoryError>;

    /// Attach a Google identity, filling the avatar only if none is set
    ///
    /// Fails with `DuplicateGoogleAccount` when another user holds the id.
    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar: Option<String>,
    ) -> Result<UserRecord, RepositoryError>;

    async fn health_check(&self) -> Result<()>;
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, avatar, google_id, created_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        let result = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, avatar, google_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .bind(&user.google_id)
        .fetch_one(&self.pool)
        .await;

        result.map_err(unique_violation)
    }

    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar: Option<String>,
    ) -> Result<UserRecord, RepositoryError> {
        sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users SET
                google_id = $2,
                avatar = COALESCE(avatar, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(google_id)
        .bind(avatar)
        .fetch_optional(&self.pool)
        .await
        .map_err(unique_violation)?
        .ok_or(RepositoryError::NotFound(id))
    }

    async fn health_check(&self) -> Result<()> {
        crate::db::health_check(&self.pool).await
    }
}

const GOOGLE_ID_INDEX: &str = "users_google_id_idx";

/// Tell the two unique indexes apart
fn unique_violation(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            if db.constraint() == Some(GOOGLE_ID_INDEX) {
                RepositoryError::DuplicateGoogleAccount
            } else {
                RepositoryError::DuplicateEmail
            }
        }
        _ => err.into(),
    }
}

/// Process-local user store
///
/// Keyed by id; email lookups scan, which is fine at development scale.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

fn google_id_taken(users: &HashMap<Uuid, UserRecord>, google_id: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| Some(u.id) != except && u.google_id.as_deref() == Some(google_id))
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        // Check and insert under one write lock so concurrent sign-ups
        // cannot both claim an email.
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(RepositoryError::DuplicateEmail);
        }
        if let Some(google_id) = user.google_id.as_deref() {
            if google_id_taken(&users, google_id, None) {
                return Err(RepositoryError::DuplicateGoogleAccount);
            }
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            avatar: user.avatar,
            google_id: user.google_id,
            created_at: Utc::now(),
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn link_google_account(
        &self,
        id: Uuid,
        google_id: &str,
        avatar: Option<String>,
    ) -> Result<UserRecord, RepositoryError> {
        let mut users = self.users.write().await;
        if google_id_taken(&users, google_id, Some(id)) {
            return Err(RepositoryError::DuplicateGoogleAccount);
        }
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound(id))?;
        user.google_id = Some(google_id.to_string());
        if user.avatar.is_none() {
            user.avatar = avatar;
        }
        Ok(user.clone())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

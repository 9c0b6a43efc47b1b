// Database repositories for users and sessions

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{NewSession, NewUser, Session, User},
};
use crate::db::with_deadline;

/// Hash a refresh token using SHA-256
///
/// Sessions are keyed by this digest; raw tokens are never stored.
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Durable user records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user; a taken email yields `DuplicateAccount`
    async fn create(&self, user: NewUser) -> Result<User, AuthError>;

    /// Exact-match lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Stamp `last_login_at` with the current time
    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError>;

    /// Replace the display name, bumping `updated_at`
    async fn update_profile(&self, id: Uuid, full_name: &str) -> Result<Option<User>, AuthError>;
}

/// Refresh-token sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewSession) -> Result<Session, AuthError>;

    /// Live session for a refresh token, or `SessionNotFound`
    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, AuthError>;

    /// Remove a session; absent tokens are not an error
    async fn delete(&self, refresh_token: &str) -> Result<(), AuthError>;

    /// Revoke every session a user holds, returning how many were removed
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError>;

    /// Purge sessions whose expiry has passed
    async fn delete_expired(&self) -> Result<u64, AuthError>;

    /// Atomically replace a live session with a new one
    ///
    /// Yields `SessionNotFound` when the old session is already gone, so at
    /// most one of several concurrent rotations succeeds.
    async fn rotate(&self, old_refresh_token: &str, replacement: NewSession)
        -> Result<Session, AuthError>;
}

/// PostgreSQL implementation of `UserStore`
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let insert = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, full_name, role, created_at, updated_at, last_login_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role)
        .fetch_one(&self.pool);

        with_deadline(self.query_timeout, async {
            insert.await.map_err(|e| {
                // Check for unique constraint violation
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return AuthError::DuplicateAccount;
                    }
                }
                AuthError::Database(e)
            })
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, password_hash, full_name, role, created_at, updated_at, last_login_at
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, password_hash, full_name, role, created_at, updated_at, last_login_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn update_profile(&self, id: Uuid, full_name: &str) -> Result<Option<User>, AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET full_name = $2, updated_at = NOW()
                WHERE id = $1
                RETURNING id, email, password_hash, full_name, role, created_at, updated_at, last_login_at
                "#,
            )
            .bind(id)
            .bind(full_name)
            .fetch_optional(&self.pool),
        )
        .await
    }
}

/// PostgreSQL implementation of `SessionStore`
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }
}

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (user_id, refresh_token_hash, user_agent, ip_address, expires_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, user_id, refresh_token_hash, user_agent, ip_address, expires_at, created_at
"#;

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn create(&self, session: NewSession) -> Result<Session, AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query_as::<_, Session>(INSERT_SESSION)
                .bind(session.user_id)
                .bind(token_digest(&session.refresh_token))
                .bind(&session.user_agent)
                .bind(&session.ip_address)
                .bind(session.expires_at)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let session = with_deadline(
            self.query_timeout,
            sqlx::query_as::<_, Session>(
                r#"
                SELECT id, user_id, refresh_token_hash, user_agent, ip_address, expires_at, created_at
                FROM sessions
                WHERE refresh_token_hash = $1 AND expires_at > NOW()
                "#,
            )
            .bind(token_digest(refresh_token))
            .fetch_optional(&self.pool),
        )
        .await?;

        session.ok_or(AuthError::SessionNotFound)
    }

    async fn delete(&self, refresh_token: &str) -> Result<(), AuthError> {
        with_deadline(
            self.query_timeout,
            sqlx::query("DELETE FROM sessions WHERE refresh_token_hash = $1")
                .bind(token_digest(refresh_token))
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let result = with_deadline(
            self.query_timeout,
            sqlx::query("DELETE FROM sessions WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<u64, AuthError> {
        let result = with_deadline(
            self.query_timeout,
            sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()").execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old_refresh_token: &str,
        replacement: NewSession,
    ) -> Result<Session, AuthError> {
        let old_digest = token_digest(old_refresh_token);
        let new_digest = token_digest(&replacement.refresh_token);

        with_deadline(self.query_timeout, async {
            let mut tx = self.pool.begin().await?;

            let deleted = sqlx::query(
                "DELETE FROM sessions WHERE refresh_token_hash = $1 AND expires_at > NOW()",
            )
            .bind(&old_digest)
            .execute(&mut *tx)
            .await?;

            if deleted.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(AuthError::SessionNotFound);
            }

            let session = sqlx::query_as::<_, Session>(INSERT_SESSION)
                .bind(replacement.user_id)
                .bind(&new_digest)
                .bind(&replacement.user_agent)
                .bind(&replacement.ip_address)
                .bind(replacement.expires_at)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<Session, AuthError>(session)
        })
        .await
    }
}

//! Database repository for password history.
//!
//! Previous password hashes are retained so that a password change can
//! reject reuse. Verification against the stored Argon2 hashes happens in
//! the handler; this repository only stores and lists them.

use crate::db::errors::Result;
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct PasswordHistory<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PasswordHistory<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Record a hash the user has used.
    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn add(&mut self, user_id: UserId, password_hash: &str) -> Result<()> {
        sqlx::query("INSERT INTO password_history (id, user_id, password_hash) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(password_hash)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// All hashes the user has ever used, newest first.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn hashes_for_user(&mut self, user_id: UserId) -> Result<Vec<String>> {
        let hashes =
            sqlx::query_scalar::<_, String>("SELECT password_hash FROM password_history WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&mut *self.db)
                .await?;
        Ok(hashes)
    }
}

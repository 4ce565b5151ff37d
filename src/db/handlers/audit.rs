//! Database repository for the audit log.

use crate::db::{
    errors::Result,
    models::audit::{AuditEntryDBRequest, AuditEntryDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct AuditLog<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AuditLog<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append an entry. The log is insert-only; entries are never updated or
    /// deleted by the service.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), action = %request.action), err)]
    pub async fn record(&mut self, request: &AuditEntryDBRequest) -> Result<AuditEntryDBResponse> {
        let entry = sqlx::query_as::<_, AuditEntryDBResponse>(
            r#"
            INSERT INTO audit_log (id, user_id, action, old_data)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.action)
        .bind(&request.old_data)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(entry)
    }

    /// Entries for a user, newest first.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<AuditEntryDBResponse>> {
        let entries = sqlx::query_as::<_, AuditEntryDBResponse>("SELECT * FROM audit_log WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(entries)
    }
}

//! Database repository for per-user settings.
//!
//! Settings rows are scoped to their owning entity via `related_id` and
//! `entity_name`; every row this service writes uses `entity_name = 'user'`.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::profile::{SettingCreateDBRequest, SettingDBResponse, SettingUpdateDBRequest},
};
use crate::types::{SettingId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

const USER_ENTITY: &str = "user";

pub struct Settings<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Settings<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Ids of the settings currently owned by `user_id`.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn ids_for_user(&mut self, user_id: UserId) -> Result<Vec<SettingId>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM settings WHERE related_id = $1 AND entity_name = $2")
            .bind(user_id)
            .bind(USER_ENTITY)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Settings<'c> {
    type CreateRequest = SettingCreateDBRequest;
    type UpdateRequest = SettingUpdateDBRequest;
    type Response = SettingDBResponse;
    type Id = SettingId;
    type Filter = UserId;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.related_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let setting = sqlx::query_as::<_, SettingDBResponse>(
            r#"
            INSERT INTO settings (id, related_id, entity_name, name, value)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.related_id)
        .bind(USER_ENTITY)
        .bind(&request.name)
        .bind(&request.value)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(setting)
    }

    #[instrument(skip(self), fields(setting_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let setting = sqlx::query_as::<_, SettingDBResponse>("SELECT * FROM settings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(setting)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(filter)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let settings =
            sqlx::query_as::<_, SettingDBResponse>("SELECT * FROM settings WHERE related_id = $1 AND entity_name = $2 ORDER BY name")
                .bind(filter)
                .bind(USER_ENTITY)
                .fetch_all(&mut *self.db)
                .await?;
        Ok(settings)
    }

    #[instrument(skip(self), fields(setting_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(setting_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let setting = sqlx::query_as::<_, SettingDBResponse>(
            r#"
            UPDATE settings SET
                name = COALESCE($2, name),
                value = COALESCE($3, value),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.value)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(setting)
    }
}

//! Database repository for custom profile fields.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::profile::{FieldCreateDBRequest, FieldDBResponse, FieldUpdateDBRequest},
};
use crate::types::{FieldId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Fields<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Fields<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Ids of the fields currently owned by `user_id`. Used to verify that an
    /// update or delete targets a record belonging to the user being edited.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn ids_for_user(&mut self, user_id: UserId) -> Result<Vec<FieldId>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM user_fields WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Fields<'c> {
    type CreateRequest = FieldCreateDBRequest;
    type UpdateRequest = FieldUpdateDBRequest;
    type Response = FieldDBResponse;
    type Id = FieldId;
    type Filter = UserId;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let field = sqlx::query_as::<_, FieldDBResponse>(
            r#"
            INSERT INTO user_fields (id, user_id, name, value)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.value)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(field)
    }

    #[instrument(skip(self), fields(field_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let field = sqlx::query_as::<_, FieldDBResponse>("SELECT * FROM user_fields WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(field)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(filter)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let fields = sqlx::query_as::<_, FieldDBResponse>("SELECT * FROM user_fields WHERE user_id = $1 ORDER BY name")
            .bind(filter)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(fields)
    }

    #[instrument(skip(self), fields(field_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_fields WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(field_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let field = sqlx::query_as::<_, FieldDBResponse>(
            r#"
            UPDATE user_fields SET
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
        Ok(field)
    }
}

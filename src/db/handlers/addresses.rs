//! Database repository for profile addresses.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::profile::{AddressCreateDBRequest, AddressDBResponse, AddressUpdateDBRequest},
};
use crate::types::{AddressId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Addresses<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Addresses<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Ids of the addresses currently owned by `user_id`.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn ids_for_user(&mut self, user_id: UserId) -> Result<Vec<AddressId>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM user_addresses WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Addresses<'c> {
    type CreateRequest = AddressCreateDBRequest;
    type UpdateRequest = AddressUpdateDBRequest;
    type Response = AddressDBResponse;
    type Id = AddressId;
    type Filter = UserId;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), label = %request.label), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let address = sqlx::query_as::<_, AddressDBResponse>(
            r#"
            INSERT INTO user_addresses (id, user_id, label, value)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.label)
        .bind(&request.value)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(address)
    }

    #[instrument(skip(self), fields(address_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let address = sqlx::query_as::<_, AddressDBResponse>("SELECT * FROM user_addresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(address)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(filter)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let addresses = sqlx::query_as::<_, AddressDBResponse>("SELECT * FROM user_addresses WHERE user_id = $1 ORDER BY label")
            .bind(filter)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(addresses)
    }

    #[instrument(skip(self), fields(address_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_addresses WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(address_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let address = sqlx::query_as::<_, AddressDBResponse>(
            r#"
            UPDATE user_addresses SET
                label = COALESCE($2, label),
                value = COALESCE($3, value),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.label)
        .bind(&request.value)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(address)
    }
}

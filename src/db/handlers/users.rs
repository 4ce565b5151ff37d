//! Database repository for users.

use crate::types::{UserId, abbrev_uuid};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::{
        memberships::{DepartmentDBResponse, RoleDBResponse},
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive substring match on email, first or last name
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            search: None,
        }
    }
}

// Database entity model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl From<(Vec<RoleDBResponse>, Vec<DepartmentDBResponse>, User)> for UserDBResponse {
    fn from((roles, departments, user): (Vec<RoleDBResponse>, Vec<DepartmentDBResponse>, User)) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            activated: user.activated,
            activated_at: user.activated_at,
            is_admin: user.is_admin,
            created_at: user.created_at,
            updated_at: user.updated_at,
            password_hash: user.password_hash,
            roles,
            departments,
        }
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    async fn roles_for(&mut self, id: UserId) -> Result<Vec<RoleDBResponse>> {
        let roles = sqlx::query_as::<_, RoleDBResponse>(
            "SELECT r.id, r.slug, r.name FROM roles r \
             INNER JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 ORDER BY r.slug",
        )
        .bind(id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(roles)
    }

    async fn departments_for(&mut self, id: UserId) -> Result<Vec<DepartmentDBResponse>> {
        let departments = sqlx::query_as::<_, DepartmentDBResponse>(
            "SELECT d.id, d.slug, d.name FROM departments d \
             INNER JOIN user_departments ud ON ud.department_id = d.id \
             WHERE ud.user_id = $1 ORDER BY d.slug",
        )
        .bind(id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(departments)
    }

    async fn hydrate(&mut self, user: User) -> Result<UserDBResponse> {
        let roles = self.roles_for(user.id).await?;
        let departments = self.departments_for(user.id).await?;
        Ok(UserDBResponse::from((roles, departments, user)))
    }

    /// Look up a user by email (emails are stored lowercased).
    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_optional(&mut *self.db)
            .await?;

        match user {
            Some(user) => Ok(Some(self.hydrate(user).await?)),
            None => Ok(None),
        }
    }

    /// Whether `email` is already registered to a user other than `user_id`.
    /// This is the duplicate check that guards email changes on update.
    #[instrument(skip(self, email), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn email_taken_by_other(&mut self, email: &str, user_id: UserId) -> Result<bool> {
        let existing = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE email = $1 AND id != $2")
            .bind(email.to_lowercase())
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(existing.is_some())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();
        let activated_at = request.activated.then(Utc::now);

        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, activated, activated_at, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.email.to_lowercase())
        .bind(&request.password_hash)
        .bind(request.activated)
        .bind(activated_at)
        .bind(request.is_admin)
        .fetch_one(&mut *tx)
        .await?;

        for role_id in &request.role_ids {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id)
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
        }

        for department_id in &request.department_ids {
            sqlx::query("INSERT INTO user_departments (user_id, department_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(user_id)
                .bind(department_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.hydrate(user).await
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match user {
            Some(user) => Ok(Some(self.hydrate(user).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($3::text IS NULL
                   OR email ILIKE '%' || $3 || '%'
                   OR first_name ILIKE '%' || $3 || '%'
                   OR last_name ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(filter.limit)
        .bind(filter.skip)
        .bind(&filter.search)
        .fetch_all(&mut *self.db)
        .await?;

        let mut result = Vec::with_capacity(users.len());
        for user in users {
            result.push(self.hydrate(user).await?);
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates; activated_at is stamped
        // when the flag flips from false to true and cleared on deactivation.
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                password_hash = COALESCE($5, password_hash),
                activated = COALESCE($6, activated),
                activated_at = CASE
                    WHEN $6 = TRUE AND activated = FALSE THEN NOW()
                    WHEN $6 = FALSE THEN NULL
                    ELSE activated_at
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.email.as_ref().map(|e| e.to_lowercase()))
        .bind(&request.password_hash)
        .bind(request.activated)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        self.hydrate(user).await
    }
}

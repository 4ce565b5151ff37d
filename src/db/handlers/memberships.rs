//! Database repositories for role and department memberships.
//!
//! Both tables have the same shape (id, slug, name) plus a join table to
//! users, and both are reconciled with attach/detach sets computed by the
//! caller. The two repositories mirror each other.

use std::collections::HashSet;

use crate::db::{
    errors::{DbError, Result},
    models::memberships::{DepartmentDBResponse, RoleDBResponse},
};
use crate::types::{DepartmentId, RoleId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Roles<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up a role by its slug, e.g. the configured default role.
    #[instrument(skip(self), err)]
    pub async fn find_by_slug(&mut self, slug: &str) -> Result<RoleDBResponse> {
        sqlx::query_as::<_, RoleDBResponse>("SELECT id, slug, name FROM roles WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Ids of the roles currently attached to `user_id`.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn ids_for_user(&mut self, user_id: UserId) -> Result<HashSet<RoleId>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT role_id FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Which of `ids` actually exist in the roles table.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn existing_ids(&mut self, ids: &[RoleId]) -> Result<HashSet<RoleId>> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(found.into_iter().collect())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn attach(&mut self, user_id: UserId, role_id: RoleId) -> Result<()> {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn detach(&mut self, user_id: UserId, role_id: RoleId) -> Result<()> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

pub struct Departments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Departments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up a department by its slug, e.g. the configured default department.
    #[instrument(skip(self), err)]
    pub async fn find_by_slug(&mut self, slug: &str) -> Result<DepartmentDBResponse> {
        sqlx::query_as::<_, DepartmentDBResponse>("SELECT id, slug, name FROM departments WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Ids of the departments currently attached to `user_id`.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn ids_for_user(&mut self, user_id: UserId) -> Result<HashSet<DepartmentId>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT department_id FROM user_departments WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// Which of `ids` actually exist in the departments table.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn existing_ids(&mut self, ids: &[DepartmentId]) -> Result<HashSet<DepartmentId>> {
        let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM departments WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(found.into_iter().collect())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn attach(&mut self, user_id: UserId, department_id: DepartmentId) -> Result<()> {
        sqlx::query("INSERT INTO user_departments (user_id, department_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(department_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn detach(&mut self, user_id: UserId, department_id: DepartmentId) -> Result<()> {
        sqlx::query("DELETE FROM user_departments WHERE user_id = $1 AND department_id = $2")
            .bind(user_id)
            .bind(department_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

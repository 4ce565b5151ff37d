//! Database models for users.

use crate::db::models::memberships::{DepartmentDBResponse, RoleDBResponse};
use crate::types::{DepartmentId, RoleId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub is_admin: bool,
    pub role_ids: Vec<RoleId>,
    pub department_ids: Vec<DepartmentId>,
}

/// Database request for updating a user's scalar columns.
///
/// `None` fields are left untouched; membership and child-record changes go
/// through their own repositories inside the same transaction.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub activated: Option<bool>,
}

/// Database response for a user
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub password_hash: String,
    pub roles: Vec<RoleDBResponse>,
    pub departments: Vec<DepartmentDBResponse>,
}

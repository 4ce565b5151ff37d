//! Database models for roles and departments.

use crate::types::{DepartmentId, RoleId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database response for a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleDBResponse {
    pub id: RoleId,
    pub slug: String,
    pub name: String,
}

/// Database response for a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DepartmentDBResponse {
    pub id: DepartmentId,
    pub slug: String,
    pub name: String,
}

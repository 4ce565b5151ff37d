//! Database models for the audit log.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Database request for recording an audit entry
#[derive(Debug, Clone)]
pub struct AuditEntryDBRequest {
    pub user_id: UserId,
    pub action: String,
    /// Snapshot of the record before the change
    pub old_data: Value,
}

/// Database response for an audit entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntryDBResponse {
    pub id: Uuid,
    pub user_id: UserId,
    pub action: String,
    pub old_data: Value,
    pub created_at: DateTime<Utc>,
}

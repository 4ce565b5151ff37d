//! Database models for profile child records: custom fields, addresses and
//! per-user settings.

use crate::types::{AddressId, FieldId, SettingId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Database request for creating a custom profile field
#[derive(Debug, Clone)]
pub struct FieldCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
    pub value: Value,
}

/// Database request for updating a custom profile field
#[derive(Debug, Clone, Default)]
pub struct FieldUpdateDBRequest {
    pub name: Option<String>,
    pub value: Option<Value>,
}

/// Database request for creating a profile address
#[derive(Debug, Clone)]
pub struct AddressCreateDBRequest {
    pub user_id: UserId,
    pub label: String,
    pub value: Value,
}

/// Database request for updating a profile address
#[derive(Debug, Clone, Default)]
pub struct AddressUpdateDBRequest {
    pub label: Option<String>,
    pub value: Option<Value>,
}

/// Database request for creating a per-user setting
#[derive(Debug, Clone)]
pub struct SettingCreateDBRequest {
    pub related_id: UserId,
    pub name: String,
    pub value: Value,
}

/// Database request for updating a per-user setting
#[derive(Debug, Clone, Default)]
pub struct SettingUpdateDBRequest {
    pub name: Option<String>,
    pub value: Option<Value>,
}

/// Database response for a custom profile field
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FieldDBResponse {
    pub id: FieldId,
    pub user_id: UserId,
    pub name: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database response for a profile address
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AddressDBResponse {
    pub id: AddressId,
    pub user_id: UserId,
    pub label: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database response for a per-user setting.
///
/// Settings are keyed by the owning entity (`related_id` + `entity_name`) so
/// the table could serve other entity types; this service only writes
/// `entity_name = 'user'` rows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SettingDBResponse {
    pub id: SettingId,
    pub related_id: UserId,
    pub entity_name: String,
    pub name: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

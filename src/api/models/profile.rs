//! API models for profile child records: custom fields, addresses and
//! per-user settings.
//!
//! Child inputs carry an optional id and a JSON value. The id/value
//! combination determines what the upsert does with the record (see
//! [`crate::reconcile::classify_child`]): no id and a present value creates,
//! id plus present value updates, id plus absent value deletes.

use crate::db::models::profile::{AddressDBResponse, FieldDBResponse, SettingDBResponse};
use crate::types::{AddressId, FieldId, SettingId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One custom field item in a create/update payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldInput {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub id: Option<FieldId>,
    pub name: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// One address item in a create/update payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressInput {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub id: Option<AddressId>,
    pub label: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// One setting item in a create/update payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingInput {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub id: Option<SettingId>,
    pub name: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// Custom field in a user response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: FieldId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub name: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Address in a user response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AddressId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub label: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Setting in a user response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SettingResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SettingId,
    pub name: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FieldDBResponse> for FieldResponse {
    fn from(db: FieldDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            name: db.name,
            value: db.value,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<AddressDBResponse> for AddressResponse {
    fn from(db: AddressDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            label: db.label,
            value: db.value,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl From<SettingDBResponse> for SettingResponse {
    fn from(db: SettingDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            value: db.value,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

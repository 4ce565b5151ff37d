//! API request/response models for users.

use super::pagination::Pagination;
use crate::api::models::profile::{AddressInput, AddressResponse, FieldInput, FieldResponse, SettingInput, SettingResponse};
use crate::config::PasswordConfig;
use crate::db::models::memberships::{DepartmentDBResponse, RoleDBResponse};
use crate::db::models::users::UserDBResponse;
use crate::errors::Error;
use crate::types::{DepartmentId, RoleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Role or department membership in a user response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MembershipResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: uuid::Uuid,
    pub slug: String,
    pub name: String,
}

impl From<RoleDBResponse> for MembershipResponse {
    fn from(db: RoleDBResponse) -> Self {
        Self {
            id: db.id,
            slug: db.slug,
            name: db.name,
        }
    }
}

impl From<DepartmentDBResponse> for MembershipResponse {
    fn from(db: DepartmentDBResponse) -> Self {
        Self {
            id: db.id,
            slug: db.slug,
            name: db.name,
        }
    }
}

// User request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// Override the configured `auth.verify_email` behavior for this request:
    /// `true` forces pending-verification, `false` forces immediate activation.
    pub check_email: Option<bool>,
    #[schema(value_type = Option<Vec<String>>, format = "uuid")]
    pub roles: Option<Vec<RoleId>>,
    #[schema(value_type = Option<Vec<String>>, format = "uuid")]
    pub departments: Option<Vec<DepartmentId>>,
    pub fields: Option<Vec<FieldInput>>,
    pub addresses: Option<Vec<AddressInput>>,
    pub settings: Option<Vec<SettingInput>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub activated: Option<bool>,
    #[schema(value_type = Option<Vec<String>>, format = "uuid")]
    pub roles: Option<Vec<RoleId>>,
    #[schema(value_type = Option<Vec<String>>, format = "uuid")]
    pub departments: Option<Vec<DepartmentId>>,
    pub fields: Option<Vec<FieldInput>>,
    pub addresses: Option<Vec<AddressInput>>,
    pub settings: Option<Vec<SettingInput>>,
}

/// Cheap structural email check; real verification is the activation flow.
fn email_is_plausible(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Validate a password against the configured length bounds.
pub fn validate_password(password: &str, config: &PasswordConfig) -> Result<(), Error> {
    if password.len() < config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", config.min_length),
        });
    }
    if password.len() > config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", config.max_length),
        });
    }
    Ok(())
}

impl UserCreate {
    pub fn validate(&self, password_config: &PasswordConfig) -> Result<(), Error> {
        if self.first_name.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "First name is required".to_string(),
            });
        }
        if self.last_name.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "Last name is required".to_string(),
            });
        }
        if !email_is_plausible(&self.email) {
            return Err(Error::BadRequest {
                message: "A valid email address is required".to_string(),
            });
        }
        validate_password(&self.password, password_config)
    }
}

impl UserUpdate {
    pub fn validate(&self, password_config: &PasswordConfig) -> Result<(), Error> {
        if let Some(first_name) = &self.first_name {
            if first_name.trim().is_empty() {
                return Err(Error::BadRequest {
                    message: "First name cannot be empty".to_string(),
                });
            }
        }
        if let Some(last_name) = &self.last_name {
            if last_name.trim().is_empty() {
                return Err(Error::BadRequest {
                    message: "Last name cannot be empty".to_string(),
                });
            }
        }
        if let Some(email) = &self.email {
            if !email_is_plausible(email) {
                return Err(Error::BadRequest {
                    message: "A valid email address is required".to_string(),
                });
            }
        }
        if let Some(password) = &self.password {
            validate_password(password, password_config)?;
        }
        Ok(())
    }
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub roles: Vec<MembershipResponse>,
    pub departments: Vec<MembershipResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Child collections, attached only when requested via `include=`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<AddressResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Vec<SettingResponse>>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            activated: db.activated,
            activated_at: db.activated_at,
            is_admin: db.is_admin,
            roles: db.roles.into_iter().map(MembershipResponse::from).collect(),
            departments: db.departments.into_iter().map(MembershipResponse::from).collect(),
            created_at: db.created_at,
            updated_at: db.updated_at,
            fields: None,
            addresses: None,
            settings: None,
        }
    }
}

/// Query parameters for listing users
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Include related data (comma-separated: "fields", "addresses", "settings")
    pub include: Option<String>,

    /// Search query to filter users by email, first or last name (case-insensitive substring match)
    pub search: Option<String>,
}

/// Query parameters for fetching a single user
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct GetUserQuery {
    /// Include related data (comma-separated: "fields", "addresses", "settings")
    pub include: Option<String>,
}

/// Parsed `include=` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Include {
    pub fields: bool,
    pub addresses: bool,
    pub settings: bool,
}

impl Include {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut include = Self::default();
        let Some(raw) = raw else { return include };
        for part in raw.split(',') {
            match part.trim() {
                "fields" => include.fields = true,
                "addresses" => include.addresses = true,
                "settings" => include.settings = true,
                _ => {} // Unknown includes are ignored rather than rejected
            }
        }
        include
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
    /// Role slugs carried in the session token
    pub roles: Vec<String>,
}

impl From<&UserDBResponse> for CurrentUser {
    fn from(db: &UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email.clone(),
            is_admin: db.is_admin,
            roles: db.roles.iter().map(|r| r.slug.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_config() -> PasswordConfig {
        PasswordConfig::default()
    }

    fn valid_create() -> UserCreate {
        UserCreate {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "correct-horse".to_string(),
            check_email: None,
            roles: None,
            departments: None,
            fields: None,
            addresses: None,
            settings: None,
        }
    }

    #[test]
    fn test_create_validation() {
        assert!(valid_create().validate(&password_config()).is_ok());

        let mut short_password = valid_create();
        short_password.password = "abc".to_string();
        assert!(short_password.validate(&password_config()).is_err());

        let mut bad_email = valid_create();
        bad_email.email = "not-an-email".to_string();
        assert!(bad_email.validate(&password_config()).is_err());

        let mut blank_name = valid_create();
        blank_name.first_name = "  ".to_string();
        assert!(blank_name.validate(&password_config()).is_err());
    }

    #[test]
    fn test_update_validation_skips_absent_fields() {
        let empty = UserUpdate::default();
        assert!(empty.validate(&password_config()).is_ok());

        let bad_email = UserUpdate {
            email: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(bad_email.validate(&password_config()).is_err());
    }

    #[test]
    fn test_include_parsing() {
        assert_eq!(Include::parse(None), Include::default());
        let parsed = Include::parse(Some("fields, settings,unknown"));
        assert!(parsed.fields);
        assert!(parsed.settings);
        assert!(!parsed.addresses);
    }
}

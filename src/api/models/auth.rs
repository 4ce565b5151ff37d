//! API models for authentication and account lifecycle endpoints.

use crate::config::PasswordConfig;
use crate::errors::Error;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::users::validate_password;

/// Public registration payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl RegisterRequest {
    pub fn validate(&self, password_config: &PasswordConfig) -> Result<(), Error> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "First and last name are required".to_string(),
            });
        }
        if !self.email.contains('@') {
            return Err(Error::BadRequest {
                message: "A valid email address is required".to_string(),
            });
        }
        validate_password(&self.password, password_config)?;
        if self.password != self.password_confirmation {
            return Err(Error::BadRequest {
                message: "Password confirmation does not match".to_string(),
            });
        }
        Ok(())
    }
}

/// Registration outcome: whether the caller must verify their email before
/// logging in.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterOutcome {
    pub check_email: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self, password_config: &PasswordConfig) -> Result<(), Error> {
        validate_password(&self.new_password, password_config)?;
        if self.new_password != self.new_password_confirmation {
            return Err(Error::BadRequest {
                message: "Password confirmation does not match".to_string(),
            });
        }
        Ok(())
    }
}

/// Change-password outcome, identifying the affected account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordOutcome {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_confirmation_must_match() {
        let request = RegisterRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "correct-horse".to_string(),
            password_confirmation: "wrong-horse".to_string(),
        };
        assert!(request.validate(&PasswordConfig::default()).is_err());
    }

    #[test]
    fn test_change_password_confirmation_must_match() {
        let request = ChangePasswordRequest {
            email: "ada@example.com".to_string(),
            current_password: "old-password".to_string(),
            new_password: "new-password".to_string(),
            new_password_confirmation: "other-password".to_string(),
        };
        assert!(request.validate(&PasswordConfig::default()).is_err());

        let matching = ChangePasswordRequest {
            new_password_confirmation: "new-password".to_string(),
            ..request
        };
        assert!(matching.validate(&PasswordConfig::default()).is_ok());
    }
}

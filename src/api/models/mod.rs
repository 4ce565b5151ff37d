//! API request/response models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod auth;
pub mod media;
pub mod pagination;
pub mod profile;
pub mod users;

/// Uniform success envelope. Every success body is `{"data": ...}`; failures
/// render `{"errors": "<message>"}` via the error type's `IntoResponse`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_value(Envelope::new("User created")).unwrap();
        assert_eq!(body, serde_json::json!({"data": "User created"}));
    }
}

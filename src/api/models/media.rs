//! API models for profile media upload and deletion.

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Successful upload: where the file was stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaUploadResponse {
    pub path: String,
}

/// Delete a previously uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaDeleteRequest {
    /// Owner of the file; non-admin callers may only pass their own id
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Storage path as returned by the upload endpoint
    pub path: String,
}

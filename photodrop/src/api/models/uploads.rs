use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Location of a stored photo
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Root-relative path the photo is served at, e.g. `/uploads/profile-photos/42-1700000000000.jpg`
    pub path: String,
}

/// Body of every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

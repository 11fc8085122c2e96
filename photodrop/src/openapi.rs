//! OpenAPI documentation for the upload API.

use utoipa::OpenApi;

use crate::api::models::uploads::{ErrorResponse, UploadResponse};

#[derive(OpenApi)]
#[openapi(
    info(title = "photodrop", description = "Profile photo upload API"),
    paths(crate::api::handlers::uploads::upload_photo),
    components(schemas(UploadResponse, ErrorResponse)),
    tags((name = "uploads", description = "Profile photo uploads"))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_path_documented() {
        let doc = ApiDoc::openapi();

        let item = doc.paths.paths.get("/api/upload").expect("upload path missing");
        assert!(item.post.is_some());

        let json = doc.to_json().unwrap();
        assert!(json.contains("multipart/form-data"));
        assert!(json.contains("UploadResponse"));
    }
}

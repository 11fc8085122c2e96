//! HTTP handler for profile photo uploads.

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info};

use crate::AppState;
use crate::api::models::uploads::UploadResponse;
use crate::config::UploadsConfig;
use crate::errors::{Error, Result};
use crate::storage::{self, PhotoStore, StagedPhoto};

/// A `file` field that has been fully streamed to disk.
struct ReceivedFile {
    staged: StagedPhoto,
    original_name: String,
    /// Unix millis at which the field started arriving; becomes part of the stored name
    received_at: i64,
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "uploads",
    summary = "Upload profile photo",
    description = "Store a single image under `<userId>-<unix millis><ext>` and return the path it is served at.",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with a `userId` text field and an image in the `file` field"
    ),
    responses(
        (status = 200, description = "Photo stored", body = UploadResponse),
        (status = 400, description = "No file, non-image file or malformed form", body = crate::api::models::uploads::ErrorResponse),
        (status = 413, description = "File too large", body = crate::api::models::uploads::ErrorResponse),
        (status = 500, description = "Failed to upload file", body = crate::api::models::uploads::ErrorResponse)
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upload_photo(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let limits = &state.config.uploads;
    let mut multipart = multipart.map_err(|rejection| parse_error(rejection.status(), rejection.body_text(), limits))?;

    let mut form = UploadForm::default();
    if let Err(e) = read_form(&state.store, limits, &mut multipart, &mut form).await {
        form.discard().await;
        return Err(e);
    }

    let Some(file) = form.file else {
        return Err(Error::MissingFile);
    };

    let user_id = form.user_id.unwrap_or_default();
    let ext = storage::extension_of(&file.original_name);
    if let Err(e) = check_filename(&user_id, file.received_at, ext) {
        file.staged.discard().await;
        return Err(e);
    }

    let size = file.staged.size();
    let filename = state.store.commit(file.staged, &user_id, file.received_at, ext).await?;

    info!(
        user_id = %user_id,
        filename = %filename,
        original_name = %file.original_name,
        bytes = size,
        "Stored profile photo"
    );

    Ok(Json(UploadResponse {
        path: state.store.public_path(&filename),
    }))
}

/// Fields collected so far. Whatever was staged is discarded if reading fails midway.
#[derive(Default)]
struct UploadForm {
    user_id: Option<String>,
    file: Option<ReceivedFile>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(file) = self.file {
            file.staged.discard().await;
        }
    }
}

async fn read_form(store: &PhotoStore, limits: &UploadsConfig, multipart: &mut Multipart, form: &mut UploadForm) -> Result<()> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error(limits))? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "userId" => {
                form.user_id = Some(field.text().await.map_err(multipart_error(limits))?);
            }
            "file" => {
                if form.file.is_some() {
                    return Err(Error::UnexpectedField { field: field_name });
                }
                form.file = Some(receive_file(store, limits, field).await?);
            }
            _ if field.file_name().is_some() => {
                return Err(Error::UnexpectedField { field: field_name });
            }
            _ => {
                debug!(field = %field_name, "Ignoring unknown form field");
            }
        }
    }

    Ok(())
}

/// The generated name has to stay inside the upload directory and fit in one path component.
fn check_filename(user_id: &str, millis: i64, ext: &str) -> Result<()> {
    if !storage::is_safe_user_id(user_id) {
        return Err(Error::BadRequest {
            message: "userId must not contain path separators".to_string(),
        });
    }

    if storage::photo_filename(user_id, millis, ext).len() > storage::MAX_FILENAME_BYTES {
        return Err(Error::BadRequest {
            message: "userId or file extension is too long".to_string(),
        });
    }

    Ok(())
}

/// Check the declared type, then stream the field into a staging file.
///
/// Nothing touches the disk for a rejected content type. A failure while streaming discards
/// the staged file before returning.
async fn receive_file(store: &PhotoStore, limits: &UploadsConfig, mut field: Field<'_>) -> Result<ReceivedFile> {
    let content_type = field.content_type().map(str::to_string);
    if !is_allowed_type(content_type.as_deref(), &limits.allowed_mime_prefix) {
        return Err(Error::InvalidFileType { content_type });
    }

    let original_name = field.file_name().unwrap_or_default().to_string();
    let received_at = Utc::now().timestamp_millis();

    debug!(original_name = %original_name, content_type = ?content_type, "Receiving file");

    let mut staged = store.stage().await?;
    let streamed = async {
        while let Some(chunk) = field.chunk().await.map_err(multipart_error(limits))? {
            staged.write_chunk(&chunk, limits.max_file_size).await?;
        }
        Ok::<_, Error>(())
    }
    .await;

    if let Err(e) = streamed {
        staged.discard().await;
        return Err(e);
    }

    Ok(ReceivedFile {
        staged,
        original_name,
        received_at,
    })
}

/// MIME types are case-insensitive; `Image/PNG` is still an image.
fn is_allowed_type(content_type: Option<&str>, prefix: &str) -> bool {
    content_type.is_some_and(|ct| {
        ct.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn multipart_error(limits: &UploadsConfig) -> impl Fn(MultipartError) -> Error + '_ {
    move |e| parse_error(e.status(), e.body_text(), limits)
}

/// Body-limit violations surface from the multipart layer with a 413 status; anything else is a
/// malformed form.
fn parse_error(status: StatusCode, detail: String, limits: &UploadsConfig) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            limit: limits.max_file_size,
        }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {detail}"),
        }
    }
}

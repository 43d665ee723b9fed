use crate::AppState;
use crate::api::error::AppError;
use crate::services::intake;
use crate::services::pipeline::{IngestState, StateTracker};
use crate::utils::validation::ValidationError;
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    response::{IntoResponse, Response},
};

pub const UPLOAD_SUCCESS_BODY: &str = "Uploaded successfully";

/// Multipart form for `POST /upload` (documentation only).
#[derive(utoipa::ToSchema)]
pub struct UploadForm {
    /// Object key, second directory level
    pub key: String,
    /// Origin namespace, first directory level
    pub origin: String,
    /// Name of the staged file
    #[schema(rename = "fileName")]
    pub file_name: String,
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File staged", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing or invalid form field", body = String),
        (status = 401, description = "Bearer token missing or invalid", body = String),
        (status = 500, description = "Staging or cache failure", body = String)
    ),
    security(
        ("jwt" = [])
    ),
    tag = "upload"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    // The auth middleware already let this request through.
    let mut tracker = StateTracker::default();
    tracker.advance(IngestState::Authenticated);

    match ingest(&state, multipart, &mut tracker).await {
        Ok(()) => UPLOAD_SUCCESS_BODY.into_response(),
        Err(e) => e
            .redact(state.config.expose_internal_errors)
            .into_response(),
    }
}

async fn ingest(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    tracker: &mut StateTracker,
) -> Result<(), AppError> {
    let mut multipart = multipart
        .map_err(|e| tracker.fail(ValidationError::Multipart(e.body_text()).into()))?;

    let upload = intake::read_upload(&mut multipart, &state.config)
        .await
        .map_err(|e| tracker.fail(e.into()))?;
    tracker.advance(IngestState::Validated);

    state.pipeline.ingest(upload, tracker).await?;
    Ok(())
}

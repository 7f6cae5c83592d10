//! Upload Routes
//!
//! HTTP endpoints for whole-file and chunked uploads.
//!
//! Endpoints:
//! - POST /api/v1/upload/single - Multipart file, stored under a generated name
//! - POST /api/v1/upload/single/named - Multipart file, stored under `filename`
//! - POST /api/v1/upload/single/base64 - Base64 file, stored by content hash
//! - POST /api/v1/upload/slices - Multipart slice named `<key>_<ordinal>.<ext>`
//! - PUT /api/v1/upload/slices/:session_key/:ordinal?ext= - Raw slice body
//! - GET /api/v1/upload/slices/:session_key - Slices staged so far
//! - POST /api/v1/upload/merge - Merge a session's slices

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::state::AppState;
use crate::storage::StoreStatus;
use crate::upload::{
    MergeReport, MergeStatus, SliceDescriptor, SliceListing, SliceReceipt, StoreReceipt,
};

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/single", post(upload_single))
        .route("/single/named", post(upload_single_named))
        .route("/single/base64", post(upload_single_base64))
        .route("/slices", post(upload_slice_form))
        .route("/slices/:session_key", get(list_slices))
        .route("/slices/:session_key/:ordinal", put(upload_slice))
        .route("/merge", post(merge))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64UploadRequest {
    pub file: String,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub session_key: String,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SliceQuery {
    pub ext: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    pub status: StoreStatus,
    pub name: String,
    pub original_filename: String,
    pub service_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceResponse {
    pub status: StoreStatus,
    pub session_key: String,
    pub ordinal: u64,
    pub name: String,
    pub service_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub status: MergeStatus,
    pub session_key: String,
    pub expected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_path: Option<String>,
}

// ============================================================================
// Whole-File Handlers
// ============================================================================

/// POST /api/v1/upload/single
async fn upload_single(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StoreResponse>, UploadError> {
    let form = UploadForm::read(multipart).await?;
    let (data, original) = form.into_file()?;

    let receipt = state.uploads().store_anonymous(&data, &original).await?;
    Ok(Json(store_response(&state, receipt)))
}

/// POST /api/v1/upload/single/named
///
/// Stores under the `filename` field; an existing file of that name is kept.
async fn upload_single_named(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StoreResponse>, UploadError> {
    let form = UploadForm::read(multipart).await?;
    let name = form.declared_name()?;
    let (data, _) = form.into_file()?;

    let receipt = state.uploads().store_named_file(&data, &name).await?;
    Ok(Json(store_response(&state, receipt)))
}

/// POST /api/v1/upload/single/base64
///
/// Stores under the SHA-256 of the decoded content.
async fn upload_single_base64(
    State(state): State<AppState>,
    Json(request): Json<Base64UploadRequest>,
) -> Result<Json<StoreResponse>, UploadError> {
    let receipt = state
        .uploads()
        .store_base64(&request.file, &request.filename)
        .await?;
    Ok(Json(store_response(&state, receipt)))
}

// ============================================================================
// Chunked Upload Handlers
// ============================================================================

/// POST /api/v1/upload/slices
///
/// Multipart slice whose `filename` field encodes session key and ordinal.
async fn upload_slice_form(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SliceResponse>, UploadError> {
    let form = UploadForm::read(multipart).await?;
    let name = form.declared_name()?;
    let (data, _) = form.into_file()?;

    let receipt = state.uploads().receive_named_slice(&name, &data).await?;
    Ok(Json(slice_response(&state, receipt)))
}

/// PUT /api/v1/upload/slices/:session_key/:ordinal?ext=
///
/// Raw slice body addressed by structured path parameters.
async fn upload_slice(
    State(state): State<AppState>,
    Path((session_key, ordinal)): Path<(String, u64)>,
    Query(query): Query<SliceQuery>,
    body: Bytes,
) -> Result<Json<SliceResponse>, UploadError> {
    let descriptor = SliceDescriptor::new(session_key, ordinal, query.ext)?;
    let receipt = state.uploads().receive_slice(&descriptor, &body).await?;
    Ok(Json(slice_response(&state, receipt)))
}

/// GET /api/v1/upload/slices/:session_key
async fn list_slices(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> Result<Json<SliceListing>, UploadError> {
    Ok(Json(state.uploads().list_slices(&session_key).await?))
}

/// POST /api/v1/upload/merge
///
/// `200` once merged, `202` while slices are still missing, `404` when
/// nothing is staged (including after an earlier successful merge).
async fn merge(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> Result<(StatusCode, Json<MergeResponse>), UploadError> {
    let report = state
        .uploads()
        .merge_session(&request.session_key, request.count)
        .await?;

    let status = match report.status {
        MergeStatus::Ok => StatusCode::OK,
        MergeStatus::Incomplete => StatusCode::ACCEPTED,
        MergeStatus::NotFound => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(merge_response(&state, report))))
}

// ============================================================================
// Helpers
// ============================================================================

/// Fields of a multipart upload form
#[derive(Default)]
struct UploadForm {
    file: Option<Bytes>,
    file_name: Option<String>,
    filename_field: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, UploadError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadError::InvalidPayload(e.to_string()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.file = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|e| UploadError::InvalidPayload(e.to_string()))?,
                    );
                }
                Some("filename") => {
                    form.filename_field = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| UploadError::InvalidPayload(e.to_string()))?,
                    );
                }
                _ => {}
            }
        }

        Ok(form)
    }

    /// `filename` field, falling back to the file part's own name
    fn declared_name(&self) -> Result<String, UploadError> {
        self.filename_field
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| self.file_name.clone())
            .ok_or_else(|| UploadError::NamingFormat("missing filename".into()))
    }

    fn into_file(self) -> Result<(Bytes, String), UploadError> {
        let original = self
            .filename_field
            .filter(|name| !name.is_empty())
            .or(self.file_name)
            .unwrap_or_default();
        let data = self
            .file
            .ok_or_else(|| UploadError::InvalidPayload("missing file field".into()))?;
        Ok((data, original))
    }
}

fn store_response(state: &AppState, receipt: StoreReceipt) -> StoreResponse {
    StoreResponse {
        status: receipt.status,
        service_path: state.service_url(&receipt.path),
        name: receipt.name,
        original_filename: receipt.original_name,
    }
}

fn slice_response(state: &AppState, receipt: SliceReceipt) -> SliceResponse {
    SliceResponse {
        status: receipt.status,
        service_path: state.service_url(&receipt.path),
        name: receipt.descriptor.file_name(),
        session_key: receipt.descriptor.session_key,
        ordinal: receipt.descriptor.ordinal,
    }
}

fn merge_response(state: &AppState, report: MergeReport) -> MergeResponse {
    MergeResponse {
        status: report.status,
        service_path: report.artifact.as_ref().map(|a| state.service_url(&a.path)),
        name: report.artifact.map(|a| a.name),
        session_key: report.session_key,
        expected: report.expected,
        present: report.present,
    }
}

// ============================================================================
// Tests
// ============================================================================

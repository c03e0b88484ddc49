use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ModelError;
use crate::logic::builder::{FlagDefaults, MAX_DEFAULT_VARIANTS};
use crate::logic::cast::{cast, infer_cast};
use crate::logic::changes::{FlagSession, SegmentSession};
use crate::logic::format::ValidationPolicy;
use crate::logic::save::{save_flag, save_segment, SaveReport};
use crate::model::{
    list_operations, FlagRecord, Id, OperationDescriptor, Scalar, SegmentRecord, VariantType,
};
use crate::store::traits::Store;

/// Store plus the editor settings every request is handled with.
pub struct ServiceState<S> {
    pub store: Arc<S>,
    pub editor: FlagDefaults,
    pub validation: ValidationPolicy,
}

impl<S> ServiceState<S> {
    pub fn new(store: Arc<S>, editor: FlagDefaults, validation: ValidationPolicy) -> Self {
        Self {
            store,
            editor,
            validation,
        }
    }
}

pub type AppState<S> = Arc<ServiceState<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(&format!("{} '{}' not found", what, id))),
    )
}

/// Model errors are the caller's fault; anything else is ours.
fn failure(e: anyhow::Error) -> ApiError {
    let status = if e.downcast_ref::<ModelError>().is_some() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("request failed: {:#}", e);
    }
    (status, Json(ErrorResponse::new(&e.to_string())))
}

pub async fn get_operations() -> Json<Vec<OperationDescriptor>> {
    Json(list_operations())
}

#[derive(Debug, Deserialize)]
pub struct CastRequest {
    pub value: Scalar,
    #[serde(rename = "type")]
    pub kind: Option<VariantType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CastResponse {
    pub value: Scalar,
}

pub async fn cast_value(RequestJson(request): RequestJson<CastRequest>) -> Json<CastResponse> {
    let value = match request.kind {
        Some(kind) => cast(&request.value, kind),
        None => infer_cast(&request.value),
    };
    Json(CastResponse { value })
}

#[derive(Debug, Deserialize)]
pub struct FlagListQuery {
    pub search: Option<String>,
}

pub async fn list_flags<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<FlagListQuery>,
) -> Result<Json<Vec<FlagRecord>>, ApiError> {
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());
    match state.store.list_flags(search).await {
        Ok(flags) => Ok(Json(flags)),
        Err(e) => Err(failure(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct DraftQuery {
    #[serde(rename = "type")]
    pub flag_type: Option<VariantType>,
    pub variants: Option<usize>,
}

pub async fn draft_flag<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<DraftQuery>,
) -> Result<Json<FlagSession>, ApiError> {
    let variant_count = query.variants.unwrap_or(state.editor.variant_count);
    if variant_count > MAX_DEFAULT_VARIANTS {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(&format!(
                "a draft can start with at most {} variants, got {}",
                MAX_DEFAULT_VARIANTS, variant_count
            ))),
        ));
    }
    let defaults = FlagDefaults {
        flag_type: query.flag_type.unwrap_or(state.editor.flag_type),
        variant_count,
    };
    Ok(Json(FlagSession::draft(&defaults)))
}

pub async fn get_flag<S: Store>(
    State(state): State<AppState<S>>,
    Path(flag_id): Path<Id>,
) -> Result<Json<FlagSession>, ApiError> {
    match state.store.get_flag(&flag_id).await {
        Ok(Some(record)) => Ok(Json(FlagSession::open(&record, &state.editor))),
        Ok(None) => Err(not_found("Flag", &flag_id)),
        Err(e) => Err(failure(e)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlagSaveResponse {
    pub report: SaveReport,
    pub session: FlagSession,
}

pub async fn save_flag_session<S: Store + 'static>(
    State(state): State<AppState<S>>,
    RequestJson(mut session): RequestJson<FlagSession>,
) -> Result<Json<FlagSaveResponse>, ApiError> {
    let report = save_flag(Arc::clone(&state.store), &mut session, &state.validation)
        .await
        .map_err(failure)?;
    Ok(Json(FlagSaveResponse { report, session }))
}

pub async fn delete_flag<S: Store>(
    State(state): State<AppState<S>>,
    Path(flag_id): Path<Id>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete_flag(&flag_id).await {
        Ok(true) => {
            log::info!("flag {} deleted", flag_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(not_found("Flag", &flag_id)),
        Err(e) => Err(failure(e)),
    }
}

pub async fn list_segments<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<SegmentRecord>>, ApiError> {
    state.store.list_segments().await.map(Json).map_err(failure)
}

pub async fn draft_segment() -> Json<SegmentSession> {
    Json(SegmentSession::draft())
}

pub async fn get_segment<S: Store>(
    State(state): State<AppState<S>>,
    Path(segment_id): Path<Id>,
) -> Result<Json<SegmentSession>, ApiError> {
    match state.store.get_segment(&segment_id).await {
        Ok(Some(record)) => Ok(Json(SegmentSession::open(&record))),
        Ok(None) => Err(not_found("Segment", &segment_id)),
        Err(e) => Err(failure(e)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentSaveResponse {
    pub report: SaveReport,
    pub session: SegmentSession,
}

pub async fn save_segment_session<S: Store + 'static>(
    State(state): State<AppState<S>>,
    RequestJson(mut session): RequestJson<SegmentSession>,
) -> Result<Json<SegmentSaveResponse>, ApiError> {
    let report = save_segment(Arc::clone(&state.store), &mut session, &state.validation)
        .await
        .map_err(failure)?;
    Ok(Json(SegmentSaveResponse { report, session }))
}

pub async fn delete_segment<S: Store>(
    State(state): State<AppState<S>>,
    Path(segment_id): Path<Id>,
) -> Result<StatusCode, ApiError> {
    match state.store.delete_segment(&segment_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found("Segment", &segment_id)),
        Err(e) => Err(failure(e)),
    }
}

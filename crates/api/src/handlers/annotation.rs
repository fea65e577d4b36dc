//! Handlers for dataset annotation fields and values.
//!
//! Saving fields reconciles every recorded value with the new fields;
//! saving values merges a partial batch into the stored values. Both run
//! as one serialized read-modify-write per dataset inside the engine.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use explorer_core::annotation_schema::Schema;
use explorer_core::annotation_values::IncomingAnnotations;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /explorer/datasets/{key}
///
/// Annotation fields and recorded values together, as the explorer page
/// renders them.
pub async fn get_dataset_annotations(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.engine.load(&key).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /explorer/datasets/{key}/annotation-fields
///
/// `data` is `null` when the dataset has no annotation fields yet.
pub async fn get_annotation_fields(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.engine.load(&key).await?;
    Ok(Json(DataResponse {
        data: snapshot.fields,
    }))
}

/// POST /explorer/datasets/{key}/annotation-fields
///
/// Replace the annotation fields and migrate recorded values: values of
/// deleted fields are dropped, renamed fields and options are relabelled.
pub async fn save_annotation_fields(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<Schema>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(schema) = payload?;

    let outcome = state.engine.save_schema(&key, schema).await?;

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /explorer/datasets/{key}/annotations
pub async fn get_annotations(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.engine.load(&key).await?;
    Ok(Json(DataResponse {
        data: snapshot.annotations,
    }))
}

/// POST /explorer/datasets/{key}/annotations
///
/// Each mentioned item's record is replaced wholesale; an empty record
/// removes the item.
pub async fn save_annotations(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<IncomingAnnotations>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(incoming) = payload?;

    let outcome = state.engine.save_annotations(&key, incoming).await?;

    Ok(Json(DataResponse { data: outcome }))
}

/// GET /explorer/datasets/{key}/annotations/summary
pub async fn annotation_summary(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let summary = state.engine.summary(&key).await?;
    Ok(Json(DataResponse { data: summary }))
}

//! Route definitions for dataset annotation fields and values.

use axum::routing::get;
use axum::Router;

use crate::handlers::annotation;
use crate::state::AppState;

/// Dataset-scoped annotation routes, nested under `/explorer/datasets`.
///
/// ```text
/// GET    /{key}                            get_dataset_annotations
/// GET    /{key}/annotation-fields          get_annotation_fields
/// POST   /{key}/annotation-fields          save_annotation_fields
/// GET    /{key}/annotations                get_annotations
/// POST   /{key}/annotations                save_annotations
/// GET    /{key}/annotations/summary        annotation_summary
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{key}", get(annotation::get_dataset_annotations))
        .route(
            "/{key}/annotation-fields",
            get(annotation::get_annotation_fields).post(annotation::save_annotation_fields),
        )
        .route(
            "/{key}/annotations",
            get(annotation::get_annotations).post(annotation::save_annotations),
        )
        .route(
            "/{key}/annotations/summary",
            get(annotation::annotation_summary),
        )
}

//! Annotation document model.

use explorer_core::types::{DatasetKey, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `annotations` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationDocument {
    pub key: DatasetKey,
    /// Serialized store; the empty string when every annotation was removed.
    pub annotations: String,
    pub updated_at: Timestamp,
}

//! Dataset model.

use explorer_core::storage::Revision;
use explorer_core::types::{DatasetKey, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `datasets` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dataset {
    pub key: DatasetKey,
    /// Raw annotation schema document; `None` when never configured.
    pub annotation_fields: Option<String>,
    /// Bumped by every schema or annotation write.
    pub revision: Revision,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

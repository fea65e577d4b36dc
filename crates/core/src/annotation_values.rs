//! Recorded annotation values, keyed by item id and then by field label.
//!
//! The whole [`AnnotationStore`] of a dataset is persisted as one JSON
//! document. An empty store is persisted as the empty string so "every
//! annotation was removed" stays distinguishable from "never annotated".

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotation_schema::Schema;
use crate::error::CoreError;
use crate::types::ItemId;

/// Blob written for a store with no records.
pub const EMPTY_STORE_BLOB: &str = "";

/// A single recorded value: free text / one dropdown choice, or the ticked
/// boxes of a checkbox field. Choices are stored by option *label*.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Single(String),
    Multiple(Vec<String>),
}

impl AnnotationValue {
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    pub fn multiple<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::Multiple(values.into_iter().map(Into::into).collect())
    }
}

/// Values recorded for one item, keyed by field label.
pub type AnnotationRecord = IndexMap<String, AnnotationValue>;

/// Partial payload of a value edit: the full new record per mentioned item.
pub type IncomingAnnotations = IndexMap<ItemId, AnnotationRecord>;

/// All annotation records of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationStore {
    items: IndexMap<ItemId, AnnotationRecord>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with_record(mut self, item_id: impl Into<ItemId>, record: AnnotationRecord) -> Self {
        self.items.insert(item_id.into(), record);
        self
    }

    pub fn get(&self, item_id: &str) -> Option<&AnnotationRecord> {
        self.items.get(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationRecord)> {
        self.items.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert or replace the record of an item, keeping its position if it
    /// was already present.
    pub fn upsert(&mut self, item_id: ItemId, record: AnnotationRecord) {
        self.items.insert(item_id, record);
    }

    /// Remove an item, keeping the order of the remaining ones.
    pub fn remove(&mut self, item_id: &str) -> Option<AnnotationRecord> {
        self.items.shift_remove(item_id)
    }

    /// Drop every item whose record has no values left.
    pub fn prune_empty(&mut self) {
        self.items.retain(|_, record| !record.is_empty());
    }

    pub(crate) fn into_items(self) -> IndexMap<ItemId, AnnotationRecord> {
        self.items
    }

    pub(crate) fn from_items(items: IndexMap<ItemId, AnnotationRecord>) -> Self {
        Self { items }
    }

    /// Decode a persisted store blob. The empty marker decodes to an empty store.
    pub fn decode(blob: &str) -> Result<Self, CoreError> {
        if blob.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(blob)
            .map_err(|e| CoreError::Internal(format!("stored annotations do not decode: {e}")))
    }

    /// Encode the store as its persisted blob.
    pub fn encode(&self) -> Result<String, CoreError> {
        if self.items.is_empty() {
            return Ok(EMPTY_STORE_BLOB.to_string());
        }
        serde_json::to_string(self)
            .map_err(|e| CoreError::Internal(format!("annotations do not encode: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Number of annotated items per field label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummaryEntry {
    pub label: String,
    pub annotated_items: usize,
    /// `false` for labels found in records that no current field carries.
    pub in_schema: bool,
}

/// Aggregated view over a dataset's annotation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationSummary {
    pub annotated_items: usize,
    pub fields: Vec<FieldSummaryEntry>,
}

/// Count annotated items per field.
///
/// Schema fields come first in schema order (including ones nobody filled
/// in yet), followed by stray labels in the order they are first seen.
pub fn summarize(schema: Option<&Schema>, store: &AnnotationStore) -> AnnotationSummary {
    let mut counts: IndexMap<&str, (usize, bool)> = IndexMap::new();

    if let Some(schema) = schema {
        for label in schema.labels() {
            counts.insert(label, (0, true));
        }
    }

    for (_, record) in store.iter() {
        for label in record.keys() {
            counts.entry(label.as_str()).or_insert((0, false)).0 += 1;
        }
    }

    AnnotationSummary {
        annotated_items: store.len(),
        fields: counts
            .into_iter()
            .map(|(label, (annotated_items, in_schema))| FieldSummaryEntry {
                label: label.to_string(),
                annotated_items,
                in_schema,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

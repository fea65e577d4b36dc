//! Annotation schema and value reconciliation for the dataset explorer.
//!
//! Researchers define annotation fields per dataset and record values per
//! item. Values are keyed by field *label*, so every schema edit has to be
//! carried through the stored values. This crate holds the pure domain
//! logic for that and the storage port the database crate implements.

pub mod annotation_schema;
pub mod annotation_values;
pub mod engine;
pub mod error;
pub mod locks;
pub mod reconciliation;
pub mod storage;
pub mod types;

//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept a pool or executor as the first argument.

pub mod annotation_repo;
pub mod dataset_repo;

pub use annotation_repo::AnnotationRepo;
pub use dataset_repo::DatasetRepo;

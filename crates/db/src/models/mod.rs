//! Row structs for the explorer tables.

pub mod annotation;
pub mod dataset;

/// Datasets are addressed by their opaque string key.
pub type DatasetKey = String;

/// Items (posts) inside a dataset are addressed by their source identifier.
pub type ItemId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

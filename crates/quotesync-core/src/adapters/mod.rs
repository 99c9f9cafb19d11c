//! Reference [`DataSource`](crate::DataSource) implementations.

pub mod http_json;
pub mod synthetic;

pub use http_json::HttpSnapshotSource;
pub use synthetic::SyntheticSource;

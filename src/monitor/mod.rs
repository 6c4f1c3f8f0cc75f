//! Monitoring page
//!
//! Renders the published process state and recent log lines over HTTP.

pub mod http;
pub mod snapshot;

pub use http::MonitorServer;
pub use snapshot::SnapshotDocument;

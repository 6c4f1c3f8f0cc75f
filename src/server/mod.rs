//! Server orchestration
//!
//! The supervisor owns the transfer engine; the lifecycle module orders
//! startup, runs the engine and the monitoring page side by side and stops
//! both on request.

pub mod lifecycle;
pub mod supervisor;

pub use lifecycle::{RunningService, start};
pub use supervisor::{StopHandle, TransferServiceSupervisor};

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod server;
pub mod state;
pub mod tls;
pub mod wizard;

pub use server::{RunningService, TransferServiceSupervisor};
pub use state::ProcessState;

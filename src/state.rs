//! Published process state
//!
//! Built once after provisioning and TLS bootstrap, then shared read-only
//! through an `Arc` with the transfer supervisor and the monitoring page.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::UserCredential;
use crate::config::{PortRange, ServerConfig};

#[derive(Debug)]
pub struct ProcessState {
    base_folder: PathBuf,
    users: Vec<UserCredential>,
    port_range: PortRange,
}

impl ProcessState {
    /// Snapshot the configuration; `base_folder` is made absolute
    pub fn publish(config: &ServerConfig) -> io::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            base_folder: std::path::absolute(&config.base_dir)?,
            users: config.users.clone(),
            port_range: config.port_range,
        }))
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn users(&self) -> &[UserCredential] {
        &self.users
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(|u| u.username.as_str())
    }

    pub fn port_range(&self) -> PortRange {
        self.port_range
    }
}

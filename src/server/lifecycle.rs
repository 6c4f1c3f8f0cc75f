//! Startup and shutdown ordering
//!
//! Every filesystem change (home directories, certificate) happens before
//! either listener binds, and both listeners are bound before any task is
//! spawned. One stop signal ends both tasks.

use log::{error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::supervisor::{StopHandle, TransferServiceSupervisor};
use crate::auth::provision;
use crate::config::{ServerConfig, Settings};
use crate::error::{FtpdError, ListenerBindError, ProvisionError};
use crate::monitor::MonitorServer;
use crate::state::ProcessState;
use crate::tls::{TlsMaterial, ensure_certificate};

/// Both services, running
pub struct RunningService {
    ftp_addr: SocketAddr,
    monitor_addr: SocketAddr,
    state: Arc<ProcessState>,
    stop: StopHandle,
    ftp_task: JoinHandle<()>,
    monitor_task: JoinHandle<std::io::Result<()>>,
}

/// Provision, bootstrap TLS, publish state, bind both listeners, then spawn.
pub async fn start(config: ServerConfig, settings: &Settings) -> Result<RunningService, FtpdError> {
    let authorization = provision(&config)?;

    let tls = if config.tls {
        let path = ensure_certificate(&settings.cert_path())?;
        Some(TlsMaterial::combined(path))
    } else {
        None
    };

    let state = ProcessState::publish(&config)
        .map_err(|e| ProvisionError::CreateDirectory(config.base_dir.clone(), e))?;

    let supervisor =
        TransferServiceSupervisor::bind(&config, authorization, tls.as_ref(), bind_ip(settings)?)
            .await?;
    let monitor_bind = SocketAddr::new(monitor_ip(settings)?, settings.monitor_port);
    let monitor =
        MonitorServer::bind(monitor_bind, Arc::clone(&state), settings.log_path()).await?;

    let ftp_addr = supervisor.local_addr();
    let monitor_addr = monitor.local_addr().map_err(|source| ListenerBindError {
        addr: monitor_bind,
        source,
    })?;
    log_summary(&config, &state, ftp_addr, monitor_addr);

    let stop = supervisor.stop_handle();
    let shutdown = stop.subscribe();
    let ftp_task = tokio::spawn(supervisor.run());
    let monitor_task = tokio::spawn(monitor.run(shutdown));

    Ok(RunningService {
        ftp_addr,
        monitor_addr,
        state,
        stop,
        ftp_task,
        monitor_task,
    })
}

impl RunningService {
    pub fn ftp_addr(&self) -> SocketAddr {
        self.ftp_addr
    }

    pub fn monitor_addr(&self) -> SocketAddr {
        self.monitor_addr
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        &self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Signal both tasks to stop without waiting
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for both tasks to finish
    pub async fn wait(self) {
        if let Err(e) = self.ftp_task.await {
            error!("FTP task failed: {}", e);
        }
        match self.monitor_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Monitoring server error: {}", e),
            Err(e) => error!("Monitoring task failed: {}", e),
        }
    }

    pub async fn shutdown(self) {
        self.stop();
        self.wait().await;
        info!("Server stopped");
    }
}

fn settings_error(message: String) -> FtpdError {
    FtpdError::Settings(config::ConfigError::Message(message))
}

fn bind_ip(settings: &Settings) -> Result<IpAddr, FtpdError> {
    settings
        .bind_ip()
        .ok_or_else(|| settings_error(format!("invalid bind_address {}", settings.bind_address)))
}

fn monitor_ip(settings: &Settings) -> Result<IpAddr, FtpdError> {
    settings
        .monitor_ip()
        .ok_or_else(|| settings_error(format!("invalid monitor_bind {}", settings.monitor_bind)))
}

fn log_summary(
    config: &ServerConfig,
    state: &ProcessState,
    ftp_addr: SocketAddr,
    monitor_addr: SocketAddr,
) {
    let mode = if config.tls { "FTPS (TLS required)" } else { "plain FTP" };
    info!("Serving {} on {}", mode, ftp_addr);
    info!("Base folder: {}", state.base_folder().display());
    info!(
        "Accounts: {} user(s), anonymous {}",
        config.users.len(),
        if config.anonymous.enabled { "enabled" } else { "disabled" }
    );
    info!(
        "Open firewall ports {} (control) and {} (passive data)",
        ftp_addr.port(),
        state.port_range()
    );
    info!("Monitoring: http://{}/admin", monitor_addr);
}

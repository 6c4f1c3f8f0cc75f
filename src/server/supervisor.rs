//! Transfer service supervisor
//!
//! Owns the bundled engine: configures it from the validated `ServerConfig`,
//! binds the control listener and runs it until a stop is requested.

use log::info;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::watch;

use crate::auth::AuthorizationTable;
use crate::config::ServerConfig;
use crate::engine::{BoundEngine, FtpEngine, ShutdownHandle};
use crate::error::{FtpdError, ListenerBindError};
use crate::tls::{TlsMaterial, load_acceptor};

pub const PLAIN_BANNER: &str = crate::engine::DEFAULT_BANNER;
pub const TLS_BANNER: &str = "Secure FTPS Server (TLS required)";

pub struct TransferServiceSupervisor {
    engine: BoundEngine,
    local_addr: SocketAddr,
}

impl TransferServiceSupervisor {
    /// Configure the engine and bind `bind_ip:config.port`.
    ///
    /// When `tls` is given every client must negotiate `AUTH TLS` and `PROT P`.
    pub async fn bind(
        config: &ServerConfig,
        authorization: AuthorizationTable,
        tls: Option<&TlsMaterial>,
        bind_ip: IpAddr,
    ) -> Result<Self, FtpdError> {
        let mut engine = FtpEngine::new(authorization)
            .passive_ports(config.port_range)
            .connection_limits(config.limits);

        engine = match tls {
            Some(material) => engine.tls(load_acceptor(material)?, true).banner(TLS_BANNER),
            None => engine.banner(PLAIN_BANNER),
        };

        let addr = SocketAddr::new(bind_ip, config.port);
        let engine = engine.bind(addr).await?;
        let local_addr = engine
            .local_addr()
            .map_err(|source| ListenerBindError { addr, source })?;

        Ok(Self { engine, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: self.engine.shutdown_handle(),
        }
    }

    /// Serve clients until `StopHandle::stop` is called
    pub async fn run(self) {
        info!("FTP service running on {}", self.local_addr);
        self.engine.serve().await;
        info!("FTP service stopped");
    }
}

/// Cloneable, non-blocking stop signal for the supervisor
#[derive(Clone)]
pub struct StopHandle {
    inner: ShutdownHandle,
}

impl StopHandle {
    /// Request shutdown; repeated calls are no-ops
    pub fn stop(&self) {
        if !self.inner.is_closed() {
            info!("Stopping FTP service");
        }
        self.inner.close_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_closed()
    }

    /// Receiver that turns `true` once `stop` has been called
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.subscribe()
    }
}

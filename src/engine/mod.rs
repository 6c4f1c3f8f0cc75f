//! Bundled FTP/FTPS engine
//!
//! A tokio control-channel server with passive-mode data connections,
//! explicit TLS (`AUTH TLS`), per-account home directories and connection
//! caps. Configured through `FtpEngine`, then bound and served until the
//! `ShutdownHandle` is closed.

pub mod commands;
mod core;
mod data_channel;
mod handlers;
mod session;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use log::info;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::auth::AuthorizationTable;
use crate::config::{ConnectionLimits, PortRange};
use crate::error::ListenerBindError;

pub const DEFAULT_BANNER: &str = "RAX FTP Server";

/// Options every session reads; shared behind an `Arc`
pub(crate) struct EngineOptions {
    pub authorization: AuthorizationTable,
    pub passive_ports: PortRange,
    /// Rotates the first port tried so concurrent PASV requests spread out
    pub passive_cursor: AtomicUsize,
    pub limits: ConnectionLimits,
    pub tls: Option<TlsAcceptor>,
    pub tls_required: bool,
    pub banner: String,
}

/// Builder for the transfer engine
pub struct FtpEngine {
    options: EngineOptions,
}

impl FtpEngine {
    pub fn new(authorization: AuthorizationTable) -> Self {
        Self {
            options: EngineOptions {
                authorization,
                passive_ports: PortRange {
                    start: 50000,
                    end: 50100,
                },
                passive_cursor: AtomicUsize::new(0),
                limits: ConnectionLimits {
                    max_connections: 256,
                    max_connections_per_ip: 10,
                },
                tls: None,
                tls_required: false,
                banner: DEFAULT_BANNER.to_string(),
            },
        }
    }

    pub fn passive_ports(mut self, range: PortRange) -> Self {
        self.options.passive_ports = range;
        self
    }

    pub fn connection_limits(mut self, limits: ConnectionLimits) -> Self {
        self.options.limits = limits;
        self
    }

    /// Offer `AUTH TLS`; with `required` plaintext logins and transfers are refused
    pub fn tls(mut self, acceptor: TlsAcceptor, required: bool) -> Self {
        self.options.tls = Some(acceptor);
        self.options.tls_required = required;
        self
    }

    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.options.banner = banner.into();
        self
    }

    /// Bind the control listener without accepting yet
    pub async fn bind(self, addr: SocketAddr) -> Result<BoundEngine, ListenerBindError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerBindError { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ListenerBindError { addr, source })?;
        info!("FTP control listener bound to {}", local);

        Ok(BoundEngine {
            listener,
            options: Arc::new(self.options),
            shutdown: ShutdownHandle::new(),
        })
    }
}

/// A bound engine ready to accept clients
pub struct BoundEngine {
    listener: TcpListener,
    options: Arc<EngineOptions>,
    shutdown: ShutdownHandle,
}

impl BoundEngine {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept clients until the shutdown handle is closed, then drain sessions
    pub async fn serve(self) {
        self::core::accept_loop(self.listener, self.options, self.shutdown.subscribe()).await;
    }
}

/// Closes the listener and every open session; safe to call repeatedly
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn close_all(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once the shutdown flag is set
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = rx.wait_for(|closed| *closed).await;
}

/// Plain or TLS-wrapped data socket
pub(crate) trait DataIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DataIo for T {}

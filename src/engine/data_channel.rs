//! Passive-mode data connections
//!
//! `PASV` binds a listener on the first free port of the configured range;
//! the next transfer command accepts exactly one connection on it, from the
//! same address as the control connection, optionally wrapped in TLS.

use log::{debug, info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::DataIo;
use crate::config::PortRange;
use crate::error::SessionError;

/// How long a client gets to connect after a transfer command
pub(crate) const DATA_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind a passive listener on `ip`, trying each port of `range` once
pub(crate) async fn open_passive(
    ip: IpAddr,
    range: PortRange,
    cursor: &AtomicUsize,
) -> Result<TcpListener, SessionError> {
    let count = range.port_count();
    if count == 0 {
        return Err(SessionError::NoPassivePort);
    }
    let first = cursor.fetch_add(1, Ordering::Relaxed) % count;

    for step in 0..count {
        let port = range.start + ((first + step) % count) as u16;
        match TcpListener::bind(SocketAddr::new(ip, port)).await {
            Ok(listener) => {
                debug!("Passive listener bound on {}:{}", ip, port);
                return Ok(listener);
            }
            Err(e) => debug!("Passive port {} unavailable: {}", port, e),
        }
    }

    warn!("No free passive port in {}", range);
    Err(SessionError::NoPassivePort)
}

/// Format the `227` reply for a bound passive listener
pub(crate) fn passive_reply(ip: Ipv4Addr, port: u16) -> String {
    let [a, b, c, d] = ip.octets();
    format!(
        "Entering Passive Mode ({},{},{},{},{},{})",
        a,
        b,
        c,
        d,
        port >> 8,
        port & 0xff
    )
}

/// Wait for the client's data connection and wrap it in TLS when requested
pub(crate) async fn accept_data(
    listener: TcpListener,
    peer_ip: IpAddr,
    tls: Option<&TlsAcceptor>,
) -> Result<Box<dyn DataIo>, SessionError> {
    let (stream, addr) = tokio::time::timeout(DATA_ACCEPT_TIMEOUT, listener.accept())
        .await
        .map_err(|_| SessionError::DataConnectionTimeout)??;

    if addr.ip().to_canonical() != peer_ip.to_canonical() {
        warn!(
            "Refusing data connection from {}, control peer is {}",
            addr, peer_ip
        );
        return Err(SessionError::ForeignDataPeer(addr));
    }

    match tls {
        Some(acceptor) => {
            let stream = acceptor
                .accept(stream)
                .await
                .map_err(SessionError::TlsHandshake)?;
            info!("Protected data connection from {}", addr);
            Ok(Box::new(stream))
        }
        None => {
            debug!("Data connection from {}", addr);
            Ok(Box::new(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[test]
    fn passive_reply_splits_the_port() {
        assert_eq!(
            passive_reply(Ipv4Addr::new(192, 168, 1, 10), 50001),
            "Entering Passive Mode (192,168,1,10,195,81)"
        );
    }

    #[tokio::test]
    async fn passive_ports_stay_inside_the_range() {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = probe.local_addr().unwrap().port();
        drop(probe);

        let range = PortRange {
            start: base,
            end: base.saturating_add(3),
        };
        let cursor = AtomicUsize::new(0);
        let listener = open_passive(IpAddr::V4(Ipv4Addr::LOCALHOST), range, &cursor)
            .await
            .unwrap();
        assert!(range.contains(listener.local_addr().unwrap().port()));
    }

    #[tokio::test]
    async fn exhausted_range_is_an_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let range = PortRange {
            start: port,
            end: port,
        };

        let result = open_passive(IpAddr::V4(Ipv4Addr::LOCALHOST), range, &AtomicUsize::new(0)).await;
        assert!(matches!(result, Err(SessionError::NoPassivePort)));
    }

    #[tokio::test]
    async fn accepts_connection_from_control_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let data = accept_data(listener, IpAddr::V4(Ipv4Addr::LOCALHOST), None).await;
        assert!(data.is_ok());
        client.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_connection_from_other_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let data = accept_data(listener, "10.1.2.3".parse().unwrap(), None).await;
        assert!(matches!(data, Err(SessionError::ForeignDataPeer(_))));
        client.await.unwrap();
    }
}

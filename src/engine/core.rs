use log::{error, info, warn};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::session;
use super::{EngineOptions, stopped};
use crate::config::ConnectionLimits;

/// How long open sessions get to finish after shutdown starts
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const TOO_MANY_CONNECTIONS: &[u8] = b"421 Too many connections, try again later\r\n";

enum Accepted {
    Client(std::io::Result<(TcpStream, SocketAddr)>),
    Stop,
}

pub(crate) async fn accept_loop(
    listener: TcpListener,
    options: Arc<EngineOptions>,
    mut shutdown: watch::Receiver<bool>,
) {
    let tracker = Arc::new(ConnectionTracker::new(options.limits));
    let mut sessions = JoinSet::new();

    info!(
        "Accepting FTP clients (max {} total, {} per IP)",
        options.limits.max_connections, options.limits.max_connections_per_ip
    );

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => Accepted::Client(result),
            _ = stopped(&mut shutdown) => Accepted::Stop,
        };

        // Reap finished sessions so the set does not grow without bound
        while sessions.try_join_next().is_some() {}

        match accepted {
            Accepted::Client(Ok((mut stream, addr))) => {
                let Some(guard) = tracker.admit(addr.ip()) else {
                    warn!("Rejecting {}: connection limit reached", addr);
                    let _ = stream.write_all(TOO_MANY_CONNECTIONS).await;
                    let _ = stream.shutdown().await;
                    continue;
                };

                let options = Arc::clone(&options);
                let session_shutdown = shutdown.clone();
                sessions.spawn(async move {
                    let _guard = guard;
                    info!("Client connected: {}", addr);
                    if let Err(e) = session::run(stream, addr, options, session_shutdown).await {
                        warn!("Session {} ended with error: {}", addr, e);
                    }
                    info!("Client disconnected: {}", addr);
                });
            }
            Accepted::Client(Err(e)) => {
                error!("Error accepting connection: {}", e);
            }
            Accepted::Stop => break,
        }
    }

    drop(listener);
    info!(
        "FTP listener closed, waiting for {} session(s) to finish",
        sessions.len()
    );

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            "Aborting {} session(s) still open after {:?}",
            sessions.len(),
            SHUTDOWN_GRACE
        );
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }
    info!("FTP engine stopped");
}

/// Counts open sessions overall and per source address
pub(crate) struct ConnectionTracker {
    limits: ConnectionLimits,
    counts: Mutex<Counts>,
}

#[derive(Default)]
struct Counts {
    total: usize,
    per_ip: HashMap<IpAddr, usize>,
}

impl ConnectionTracker {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self {
            limits,
            counts: Mutex::new(Counts::default()),
        }
    }

    /// Reserve a slot for `ip`, or `None` when either cap is reached
    pub fn admit(self: &Arc<Self>, ip: IpAddr) -> Option<ConnectionGuard> {
        let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        let from_ip = counts.per_ip.get(&ip).copied().unwrap_or(0);

        if counts.total >= self.limits.max_connections
            || from_ip >= self.limits.max_connections_per_ip
        {
            return None;
        }

        counts.total += 1;
        counts.per_ip.insert(ip, from_ip + 1);
        Some(ConnectionGuard {
            tracker: Arc::clone(self),
            ip,
        })
    }

    fn release(&self, ip: IpAddr) {
        let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        counts.total = counts.total.saturating_sub(1);
        if let Some(n) = counts.per_ip.get_mut(&ip) {
            *n -= 1;
            if *n == 0 {
                counts.per_ip.remove(&ip);
            }
        }
    }
}

/// Frees the slot when the session ends
pub(crate) struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    ip: IpAddr,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release(self.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(total: usize, per_ip: usize) -> Arc<ConnectionTracker> {
        Arc::new(ConnectionTracker::new(ConnectionLimits {
            max_connections: total,
            max_connections_per_ip: per_ip,
        }))
    }

    #[test]
    fn per_ip_cap_is_enforced() {
        let tracker = tracker(10, 2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.2".parse().unwrap();

        let first = tracker.admit(ip).unwrap();
        let _second = tracker.admit(ip).unwrap();
        assert!(tracker.admit(ip).is_none());
        assert!(tracker.admit(other).is_some());

        drop(first);
        assert!(tracker.admit(ip).is_some());
    }

    #[test]
    fn total_cap_is_enforced() {
        let tracker = tracker(2, 5);
        let _a = tracker.admit("10.0.0.1".parse().unwrap()).unwrap();
        let _b = tracker.admit("10.0.0.2".parse().unwrap()).unwrap();
        assert!(tracker.admit("10.0.0.3".parse().unwrap()).is_none());
    }

    #[test]
    fn released_addresses_are_forgotten() {
        let tracker = tracker(4, 4);
        let ip: IpAddr = "10.0.0.9".parse().unwrap();
        drop(tracker.admit(ip).unwrap());

        let counts = tracker.counts.lock().unwrap();
        assert_eq!(counts.total, 0);
        assert!(counts.per_ip.is_empty());
    }
}

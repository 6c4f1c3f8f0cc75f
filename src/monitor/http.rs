//! Monitoring HTTP server
//!
//! Serves `GET /admin` on its own listener until the shared stop signal fires.

use axum::{Router, extract::State, response::Html, routing::get};
use log::{debug, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::snapshot::SnapshotDocument;
use crate::engine::stopped;
use crate::error::ListenerBindError;
use crate::state::ProcessState;

#[derive(Clone)]
struct MonitorState {
    process: Arc<ProcessState>,
    log_path: PathBuf,
}

pub struct MonitorServer {
    listener: TcpListener,
    router: Router,
}

impl MonitorServer {
    pub async fn bind(
        addr: SocketAddr,
        process: Arc<ProcessState>,
        log_path: PathBuf,
    ) -> Result<Self, ListenerBindError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerBindError { addr, source })?;

        let router = Router::new()
            .route("/admin", get(admin_page))
            .with_state(MonitorState { process, log_path });

        Ok(Self { listener, router })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` turns true, then finish in-flight requests
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        info!("Monitoring page at http://{}/admin", addr);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { stopped(&mut shutdown).await })
            .await?;

        info!("Monitoring server stopped");
        Ok(())
    }
}

async fn admin_page(State(state): State<MonitorState>) -> Html<String> {
    let log = match tokio::fs::read_to_string(&state.log_path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Log file {} unreadable: {}", state.log_path.display(), e);
            None
        }
    };

    Html(SnapshotDocument::render(&state.process, log.as_deref()).to_html())
}

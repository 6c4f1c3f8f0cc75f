//! Control-channel session
//!
//! Reads command lines from one client, dispatches them and upgrades the
//! control stream in place when the client negotiates `AUTH TLS`.

use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::commands::parse_command;
use super::{EngineOptions, stopped};
use crate::auth::Account;
use crate::error::SessionError;

/// Longest accepted command line, terminator included
const MAX_LINE_BYTES: u64 = 512;

/// What the dispatcher wants the read loop to do next
pub(crate) enum Flow {
    Continue,
    Quit,
    UpgradeTls,
}

enum LoopExit<S> {
    Closed,
    Upgrade(S),
}

enum Event {
    Line(std::io::Result<usize>),
    Shutdown,
}

/// Per-connection state
pub(crate) struct Session {
    pub options: Arc<EngineOptions>,
    pub peer: SocketAddr,
    pub local: SocketAddr,
    pub pending_user: Option<String>,
    pub account: Option<Account>,
    pub cwd: String,
    pub tls_active: bool,
    pub protected_data: bool,
    pub rename_from: Option<std::path::PathBuf>,
    pub passive: Option<TcpListener>,
    shutdown: watch::Receiver<bool>,
}

/// Serve one client until it quits, disconnects or the engine shuts down
pub(crate) async fn run(
    mut stream: TcpStream,
    peer: SocketAddr,
    options: Arc<EngineOptions>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let local = stream.local_addr()?;
    let mut session = Session {
        options,
        peer,
        local,
        pending_user: None,
        account: None,
        cwd: "/".to_string(),
        tls_active: false,
        protected_data: false,
        rename_from: None,
        passive: None,
        shutdown,
    };

    reply(&mut stream, 220, &session.options.banner).await?;

    let stream = match session.drive(stream).await? {
        LoopExit::Closed => return Ok(()),
        LoopExit::Upgrade(stream) => stream,
    };

    let Some(acceptor) = session.options.tls.clone() else {
        return Ok(());
    };
    let tls = acceptor
        .accept(stream)
        .await
        .map_err(SessionError::TlsHandshake)?;
    session.tls_active = true;
    info!("Control channel for {} upgraded to TLS", peer);

    // AUTH is refused once TLS is active, so this pass cannot ask to upgrade again
    session.drive(tls).await.map(|_| ())
}

impl Session {
    async fn drive<S>(&mut self, stream: S) -> Result<LoopExit<S>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();
            let event = {
                let mut limited = (&mut reader).take(MAX_LINE_BYTES);
                tokio::select! {
                    read = limited.read_line(&mut line) => Event::Line(read),
                    _ = stopped(&mut self.shutdown) => Event::Shutdown,
                }
            };

            let read = match event {
                Event::Shutdown => {
                    // The client may already be gone
                    let _ = reply(reader.get_mut(), 421, "Server shutting down").await;
                    return Ok(LoopExit::Closed);
                }
                Event::Line(read) => read?,
            };

            if read == 0 {
                debug!("Client {} closed the control connection", self.peer);
                return Ok(LoopExit::Closed);
            }

            if !line.ends_with('\n') && read as u64 >= MAX_LINE_BYTES {
                reply(reader.get_mut(), 500, "Command too long").await?;
                return Ok(LoopExit::Closed);
            }

            let command = parse_command(&line);
            debug!("{} -> {}", self.peer, command);

            match self.handle(command, reader.get_mut()).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(LoopExit::Closed),
                Flow::UpgradeTls => return Ok(LoopExit::Upgrade(reader.into_inner())),
            }
        }
    }
}

/// Write one single-line reply and flush it through any TLS layer
pub(crate) async fn reply<W>(ctrl: &mut W, code: u16, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    ctrl.write_all(format!("{} {}\r\n", code, text).as_bytes())
        .await?;
    ctrl.flush().await
}

//! Command handlers
//!
//! Applies the TLS, login and permission gates to each parsed command, then
//! performs it against the account's home directory.

use log::{info, warn};
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::DataIo;
use super::commands::Command;
use super::data_channel::{accept_data, open_passive, passive_reply};
use super::session::{Flow, Session, reply};
use super::storage::{self, resolve_virtual, virtual_to_real};
use crate::auth::{Account, Permissions, UserCheck, validate_password, validate_user};
use crate::error::SessionError;
use crate::error::handlers::error_to_reply;

impl Session {
    pub(crate) async fn handle<W>(
        &mut self,
        command: Command,
        ctrl: &mut W,
    ) -> Result<Flow, SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let tls_required = self.options.tls_required;

        if tls_required && !self.tls_active && !command.allowed_before_tls() {
            reply(ctrl, 530, "TLS required, use AUTH TLS first").await?;
            return Ok(Flow::Continue);
        }

        if !command.requires_login() {
            return self.handle_session_command(command, ctrl).await;
        }

        let Some(account) = self.account.clone() else {
            reply(ctrl, 530, "Please login with USER and PASS").await?;
            return Ok(Flow::Continue);
        };

        if tls_required && command.uses_data_channel() && !self.protected_data {
            reply(ctrl, 522, "Data connections must be protected, use PROT P").await?;
            return Ok(Flow::Continue);
        }

        self.handle_file_command(command, &account, ctrl).await?;
        Ok(Flow::Continue)
    }

    /// Login, TLS negotiation and informational commands
    async fn handle_session_command<W>(
        &mut self,
        command: Command,
        ctrl: &mut W,
    ) -> Result<Flow, SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match command {
            Command::USER(username) => {
                self.account = None;
                match validate_user(&self.options.authorization, &username) {
                    UserCheck::PasswordRequired => {
                        reply(ctrl, 331, &format!("Password required for {}", username)).await?;
                        self.pending_user = Some(username);
                    }
                    UserCheck::Anonymous => {
                        reply(ctrl, 331, "Anonymous login okay, send your email as password")
                            .await?;
                        self.pending_user = Some(username);
                    }
                    UserCheck::Unknown => {
                        reply(ctrl, 530, "Invalid username").await?;
                    }
                }
            }
            Command::PASS(password) => {
                let Some(username) = self.pending_user.take() else {
                    reply(ctrl, 503, "Login with USER first").await?;
                    return Ok(Flow::Continue);
                };
                let found =
                    validate_password(&self.options.authorization, &username, &password).cloned();
                match found {
                    Some(account) => {
                        info!("User {} logged in from {}", account.username, self.peer);
                        self.account = Some(account);
                        self.cwd = "/".to_string();
                        reply(ctrl, 230, "User logged in").await?;
                    }
                    None => {
                        warn!("Failed login for {} from {}", username, self.peer);
                        reply(ctrl, 530, "Login incorrect").await?;
                    }
                }
            }
            Command::AUTH(mechanism) => {
                if self.options.tls.is_none() {
                    reply(ctrl, 502, "TLS not available").await?;
                } else if self.tls_active {
                    reply(ctrl, 503, "TLS already active").await?;
                } else if matches!(mechanism.to_ascii_uppercase().as_str(), "TLS" | "TLS-C" | "SSL")
                {
                    reply(ctrl, 234, "AUTH TLS successful").await?;
                    return Ok(Flow::UpgradeTls);
                } else {
                    reply(ctrl, 504, "Unsupported AUTH type").await?;
                }
            }
            Command::PBSZ(_) => {
                if self.tls_active {
                    reply(ctrl, 200, "PBSZ=0").await?;
                } else {
                    reply(ctrl, 503, "PBSZ requires AUTH TLS first").await?;
                }
            }
            Command::PROT(level) => {
                if !self.tls_active {
                    reply(ctrl, 503, "PROT requires AUTH TLS first").await?;
                    return Ok(Flow::Continue);
                }
                match level.to_ascii_uppercase().as_str() {
                    "P" => {
                        self.protected_data = true;
                        reply(ctrl, 200, "Data channel protection set to Private").await?;
                    }
                    "C" if self.options.tls_required => {
                        reply(ctrl, 534, "Clear data channel not allowed").await?;
                    }
                    "C" => {
                        self.protected_data = false;
                        reply(ctrl, 200, "Data channel protection set to Clear").await?;
                    }
                    _ => reply(ctrl, 504, "Unsupported protection level").await?,
                }
            }
            Command::SYST => reply(ctrl, 215, "UNIX Type: L8").await?,
            Command::FEAT => {
                let mut features = String::from("211-Features:\r\n PASV\r\n UTF8\r\n");
                if self.options.tls.is_some() {
                    features.push_str(" AUTH TLS\r\n PBSZ\r\n PROT\r\n");
                }
                features.push_str("211 End\r\n");
                ctrl.write_all(features.as_bytes()).await?;
                ctrl.flush().await?;
            }
            Command::NOOP => reply(ctrl, 200, "NOOP ok").await?,
            Command::QUIT => {
                reply(ctrl, 221, "Goodbye").await?;
                return Ok(Flow::Quit);
            }
            Command::SYNTAX(verb) => {
                reply(ctrl, 501, &format!("Syntax error in arguments for {}", verb)).await?;
            }
            Command::UNKNOWN(verb) => {
                warn!("Unsupported command {} from {}", verb, self.peer);
                reply(ctrl, 502, "Command not implemented").await?;
            }
            other => {
                // Only reachable if `requires_login` and this match disagree
                warn!("Command {} dispatched without login check", other);
                reply(ctrl, 530, "Please login with USER and PASS").await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Navigation, listing and transfer commands for a logged-in account
    async fn handle_file_command<W>(
        &mut self,
        command: Command,
        account: &Account,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let required = match &command {
            Command::PWD | Command::TYPE(_) | Command::PASV => Permissions::empty(),
            Command::CWD(_) | Command::CDUP => Permissions::CHANGE_DIR,
            Command::LIST(_) | Command::NLST(_) => Permissions::LIST,
            Command::RETR(_) => Permissions::READ,
            Command::STOR(_) => Permissions::WRITE,
            Command::APPE(_) => Permissions::APPEND,
            Command::DELE(_) | Command::RMD(_) => Permissions::DELETE,
            Command::MKD(_) => Permissions::MKDIR,
            Command::RNFR(_) | Command::RNTO(_) => Permissions::RENAME,
            _ => Permissions::empty(),
        };
        if !account.permissions.contains(required) {
            warn!("{} denied {} from {}", account.username, command, self.peer);
            reply(ctrl, 550, "Permission denied").await?;
            return Ok(());
        }

        match command {
            Command::PWD => {
                reply(ctrl, 257, &format!("\"{}\" is the current directory", self.cwd)).await?;
            }
            Command::CWD(path) => self.change_directory(&path, account, ctrl).await?,
            Command::CDUP => self.change_directory("..", account, ctrl).await?,
            Command::TYPE(kind) => match kind.to_ascii_uppercase().as_str() {
                "A" | "A N" => reply(ctrl, 200, "Type set to A").await?,
                "I" | "L 8" => reply(ctrl, 200, "Type set to I").await?,
                _ => reply(ctrl, 504, "Unsupported type").await?,
            },
            Command::PASV => self.enter_passive(ctrl).await?,
            Command::LIST(arg) => self.send_listing(arg, account, true, ctrl).await?,
            Command::NLST(arg) => self.send_listing(arg, account, false, ctrl).await?,
            Command::RETR(path) => self.send_file(&path, account, ctrl).await?,
            Command::STOR(path) => self.receive_file(&path, account, false, ctrl).await?,
            Command::APPE(path) => self.receive_file(&path, account, true, ctrl).await?,
            Command::DELE(path) => {
                let (virt, real) = self.resolve(&path, account);
                if virt != "/" && fs::remove_file(&real).await.is_ok() {
                    info!("{} deleted {}", account.username, virt);
                    reply(ctrl, 250, "File deleted").await?;
                } else {
                    reply(ctrl, 550, "Could not delete file").await?;
                }
            }
            Command::MKD(path) => {
                let (virt, real) = self.resolve(&path, account);
                if virt != "/" && fs::create_dir(&real).await.is_ok() {
                    info!("{} created directory {}", account.username, virt);
                    reply(ctrl, 257, &format!("\"{}\" created", virt)).await?;
                } else {
                    reply(ctrl, 550, "Could not create directory").await?;
                }
            }
            Command::RMD(path) => {
                let (virt, real) = self.resolve(&path, account);
                if virt != "/" && fs::remove_dir(&real).await.is_ok() {
                    info!("{} removed directory {}", account.username, virt);
                    if self.cwd == virt || self.cwd.starts_with(&format!("{}/", virt)) {
                        self.cwd = "/".to_string();
                    }
                    reply(ctrl, 250, "Directory removed").await?;
                } else {
                    reply(ctrl, 550, "Could not remove directory").await?;
                }
            }
            Command::RNFR(path) => {
                let (virt, real) = self.resolve(&path, account);
                if virt != "/" && fs::metadata(&real).await.is_ok() {
                    self.rename_from = Some(real);
                    reply(ctrl, 350, "Ready for RNTO").await?;
                } else {
                    reply(ctrl, 550, "No such file or directory").await?;
                }
            }
            Command::RNTO(path) => {
                let Some(from) = self.rename_from.take() else {
                    reply(ctrl, 503, "Send RNFR first").await?;
                    return Ok(());
                };
                let (virt, real) = self.resolve(&path, account);
                if virt != "/" && fs::rename(&from, &real).await.is_ok() {
                    info!("{} renamed {} to {}", account.username, from.display(), virt);
                    reply(ctrl, 250, "Rename successful").await?;
                } else {
                    reply(ctrl, 550, "Rename failed").await?;
                }
            }
            other => {
                reply(ctrl, 502, &format!("{} not supported here", other)).await?;
            }
        }
        Ok(())
    }

    fn resolve(&self, arg: &str, account: &Account) -> (String, PathBuf) {
        let virt = resolve_virtual(&self.cwd, arg);
        let real = virtual_to_real(&account.home, &virt);
        (virt, real)
    }

    async fn change_directory<W>(
        &mut self,
        arg: &str,
        account: &Account,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (virt, real) = self.resolve(arg, account);
        match fs::metadata(&real).await {
            Ok(meta) if meta.is_dir() => {
                reply(ctrl, 250, &format!("Directory changed to {}", virt)).await?;
                self.cwd = virt;
            }
            _ => reply(ctrl, 550, "No such directory").await?,
        }
        Ok(())
    }

    async fn enter_passive<W>(&mut self, ctrl: &mut W) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // A new PASV replaces any listener the client never used
        self.passive = None;

        let ip = match self.local.ip().to_canonical() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                reply(ctrl, 522, "PASV needs an IPv4 control connection").await?;
                return Ok(());
            }
        };

        match open_passive(
            IpAddr::V4(ip),
            self.options.passive_ports,
            &self.options.passive_cursor,
        )
        .await
        {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                self.passive = Some(listener);
                reply(ctrl, 227, &passive_reply(ip, port)).await?;
            }
            Err(e) => {
                ctrl.write_all(error_to_reply(&e).as_bytes()).await?;
                ctrl.flush().await?;
            }
        }
        Ok(())
    }

    /// Send `150`, then wait for the client's data connection
    async fn open_data<W>(
        &mut self,
        what: &str,
        ctrl: &mut W,
    ) -> Result<Option<Box<dyn DataIo>>, SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let Some(listener) = self.passive.take() else {
            let e = SessionError::NoDataConnection;
            ctrl.write_all(error_to_reply(&e).as_bytes()).await?;
            ctrl.flush().await?;
            return Ok(None);
        };

        reply(ctrl, 150, &format!("Opening data connection for {}", what)).await?;

        let tls = if self.protected_data {
            self.options.tls.as_ref()
        } else {
            None
        };
        match accept_data(listener, self.peer.ip(), tls).await {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("Data connection for {} failed: {}", self.peer, e);
                ctrl.write_all(error_to_reply(&e).as_bytes()).await?;
                ctrl.flush().await?;
                Ok(None)
            }
        }
    }

    async fn finish_transfer<W>(
        &self,
        result: std::io::Result<()>,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match result {
            Ok(()) => reply(ctrl, 226, "Transfer complete").await?,
            Err(e) => {
                warn!("Transfer for {} aborted: {}", self.peer, e);
                reply(ctrl, 426, "Connection closed; transfer aborted").await?;
            }
        }
        Ok(())
    }

    async fn send_listing<W>(
        &mut self,
        arg: Option<String>,
        account: &Account,
        detailed: bool,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        // Arguments such as `-la` are ls flags, not paths
        let target = arg.filter(|a| !a.starts_with('-'));
        let (_, real) = self.resolve(target.as_deref().unwrap_or("."), account);

        let entries = match storage::list(&real).await {
            Ok(entries) => entries,
            Err(_) => {
                reply(ctrl, 550, "No such file or directory").await?;
                return Ok(());
            }
        };

        let Some(mut data) = self.open_data("directory listing", ctrl).await? else {
            return Ok(());
        };

        let mut body = String::new();
        for entry in &entries {
            if detailed {
                body.push_str(&entry.to_list_line());
            } else {
                body.push_str(&entry.name);
            }
            body.push_str("\r\n");
        }

        let result = async {
            data.write_all(body.as_bytes()).await?;
            data.shutdown().await
        }
        .await;
        self.finish_transfer(result, ctrl).await
    }

    async fn send_file<W>(
        &mut self,
        path: &str,
        account: &Account,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (virt, real) = self.resolve(path, account);
        let is_file = fs::metadata(&real).await.is_ok_and(|m| m.is_file());
        let file = if is_file { fs::File::open(&real).await.ok() } else { None };
        let Some(mut file) = file else {
            reply(ctrl, 550, "No such file").await?;
            return Ok(());
        };

        let Some(mut data) = self.open_data(&virt, ctrl).await? else {
            return Ok(());
        };

        let result = async {
            let sent = tokio::io::copy(&mut file, &mut data).await?;
            data.shutdown().await?;
            info!("{} downloaded {} ({} bytes)", account.username, virt, sent);
            Ok::<_, std::io::Error>(())
        }
        .await;
        self.finish_transfer(result, ctrl).await
    }

    async fn receive_file<W>(
        &mut self,
        path: &str,
        account: &Account,
        append: bool,
        ctrl: &mut W,
    ) -> Result<(), SessionError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let (virt, real) = self.resolve(path, account);
        if virt == "/" {
            reply(ctrl, 550, "Invalid file name").await?;
            return Ok(());
        }

        if tokio::fs::metadata(&real).await.is_ok_and(|meta| meta.is_dir()) {
            reply(ctrl, 550, "Cannot create file").await?;
            return Ok(());
        }

        // The target is only touched once a data connection exists
        let Some(mut data) = self.open_data(&virt, ctrl).await? else {
            return Ok(());
        };

        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let mut file = match options.open(&real).await {
            Ok(file) => file,
            Err(e) => {
                warn!("{} cannot write {}: {}", account.username, virt, e);
                drop(data);
                reply(ctrl, 550, "Cannot create file").await?;
                return Ok(());
            }
        };

        let result = async {
            let received = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            info!("{} uploaded {} ({} bytes)", account.username, virt, received);
            Ok::<_, std::io::Error>(())
        }
        .await;
        self.finish_transfer(result, ctrl).await
    }
}

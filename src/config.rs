//! Configuration management for RAX FTPD
//!
//! Separates operator settings loaded at startup (`ftpd.toml` plus `RAX_FTPD_*`
//! environment overrides) from the validated `ServerConfig` the rest of the
//! startup sequence consumes.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::auth::UserCredential;
use crate::auth::credentials::load_users;
use crate::error::{FtpdError, InputValidationError};

pub const DEFAULT_CONTROL_PORT: u16 = 2121;
pub const ANONYMOUS_DIR: &str = "anonymous";

/// Logins that map onto the anonymous account
pub const ANONYMOUS_LOGINS: [&str; 2] = ["anonymous", "ftp"];

/// Settings that are read once at startup and never prompted for
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    // ═══ LISTENERS ═══
    /// Interface the FTP control listener binds to
    pub bind_address: String,

    /// Interface and port for the monitoring page
    pub monitor_bind: String,
    pub monitor_port: u16,

    /// Inclusive port range for PASV data connections
    pub passive_port_start: u16,
    pub passive_port_end: u16,

    // ═══ LIMITS ═══
    pub max_connections: usize,
    pub max_connections_per_ip: usize,

    // ═══ FILES ═══
    pub users_file: String,
    pub cert_file: String,
    pub log_file: String,
    pub log_retain_days: usize,

    // ═══ STARTUP MODE ═══
    /// Run the console wizard; when false the values below are used instead
    pub interactive: bool,
    pub control_port: u16,
    pub anonymous: bool,
    pub server_root: Option<String>,
    pub tls: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            monitor_bind: "127.0.0.1".to_string(),
            monitor_port: 8080,
            passive_port_start: 50000,
            passive_port_end: 50100,
            max_connections: 256,
            max_connections_per_ip: 10,
            users_file: "users.txt".to_string(),
            cert_file: "server.pem".to_string(),
            log_file: "ftp.log".to_string(),
            log_retain_days: 7,
            interactive: true,
            control_port: DEFAULT_CONTROL_PORT,
            anonymous: false,
            server_root: None,
            tls: false,
        }
    }
}

impl Settings {
    /// Load settings from `ftpd.toml` (optional) with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name("ftpd").required(false))
            .add_source(Environment::with_prefix("RAX_FTPD"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validation for all settings values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.passive_port_start == 0 {
            return Err(config::ConfigError::Message(
                "passive_port_start cannot be 0".into(),
            ));
        }

        if self.passive_port_start > self.passive_port_end {
            return Err(config::ConfigError::Message(
                "passive_port_start must not exceed passive_port_end".into(),
            ));
        }

        if self.monitor_port == 0 {
            return Err(config::ConfigError::Message(
                "monitor_port cannot be 0".into(),
            ));
        }

        if self.max_connections == 0 || self.max_connections_per_ip == 0 {
            return Err(config::ConfigError::Message(
                "connection limits must be greater than 0".into(),
            ));
        }

        if self.bind_ip().is_none() || self.monitor_ip().is_none() {
            return Err(config::ConfigError::Message(
                "bind_address and monitor_bind must be IP addresses".into(),
            ));
        }

        Ok(())
    }

    pub fn bind_ip(&self) -> Option<IpAddr> {
        self.bind_address.parse().ok()
    }

    pub fn monitor_ip(&self) -> Option<IpAddr> {
        self.monitor_bind.parse().ok()
    }

    pub fn port_range(&self) -> PortRange {
        PortRange {
            start: self.passive_port_start,
            end: self.passive_port_end,
        }
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_connections: self.max_connections,
            max_connections_per_ip: self.max_connections_per_ip,
        }
    }

    pub fn users_path(&self) -> PathBuf {
        PathBuf::from(&self.users_file)
    }

    pub fn cert_path(&self) -> PathBuf {
        PathBuf::from(&self.cert_file)
    }

    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.log_file)
    }
}

/// Inclusive port interval reserved for data connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn port_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
}

/// Anonymous access policy; anonymous sessions are always read+list only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousPolicy {
    pub enabled: bool,
    pub directory: PathBuf,
}

/// Fully validated server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub anonymous: AnonymousPolicy,
    pub users: Vec<UserCredential>,
    pub base_dir: PathBuf,
    pub tls: bool,
    pub port_range: PortRange,
    pub limits: ConnectionLimits,
}

impl ServerConfig {
    /// Assemble a config from wizard answers and startup settings
    pub fn new(
        port: u16,
        allow_anonymous: bool,
        users: Vec<UserCredential>,
        base_dir: PathBuf,
        tls: bool,
        settings: &Settings,
    ) -> Self {
        let anonymous = AnonymousPolicy {
            enabled: allow_anonymous,
            directory: base_dir.join(ANONYMOUS_DIR),
        };
        Self {
            port,
            anonymous,
            users,
            base_dir,
            tls,
            port_range: settings.port_range(),
            limits: settings.limits(),
        }
    }

    /// Build a config without the wizard, reading users from the user-list file
    pub fn unattended(settings: &Settings) -> Result<Self, FtpdError> {
        let root = settings.server_root.as_deref().ok_or_else(|| {
            FtpdError::Settings(config::ConfigError::Message(
                "server_root is required when interactive = false".into(),
            ))
        })?;

        let users_path = settings.users_path();
        let users = if users_path.exists() {
            load_users(&users_path)?
        } else {
            Vec::new()
        };

        let config = Self::new(
            settings.control_port,
            settings.anonymous,
            users,
            crate::wizard::expand_root(root),
            settings.tls,
            settings,
        );
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every consumer relies on
    pub fn validate(&self) -> Result<(), InputValidationError> {
        if self.port == 0 {
            return Err(InputValidationError::InvalidPort(self.port.to_string()));
        }

        if self.port_range.start > self.port_range.end || self.port_range.contains(self.port) {
            return Err(InputValidationError::InvalidPort(format!(
                "{} (passive range {})",
                self.port, self.port_range
            )));
        }

        if !self.anonymous.enabled && self.users.is_empty() {
            return Err(InputValidationError::NoUsers);
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            validate_username(&user.username)?;
            if user.password.is_empty() {
                return Err(InputValidationError::EmptyCredentialField);
            }
            if !seen.insert(user.username.as_str()) {
                return Err(InputValidationError::DuplicateUser(user.username.clone()));
            }
        }

        Ok(())
    }

}

/// Usernames double as directory names under the base folder
pub fn validate_username(username: &str) -> Result<(), InputValidationError> {
    if username.is_empty() {
        return Err(InputValidationError::EmptyCredentialField);
    }

    if username == "."
        || username == ".."
        || ANONYMOUS_LOGINS
            .iter()
            .any(|login| login.eq_ignore_ascii_case(username))
        || username.contains(['/', '\\', '\0', '\r', '\n'])
    {
        return Err(InputValidationError::InvalidUsername(username.to_string()));
    }

    Ok(())
}

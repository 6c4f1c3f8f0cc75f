//! Error types
//!
//! Defines domain-specific error types for each stage of server startup,
//! plus the per-connection errors contained inside the transfer engine.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Operator input rejected by the configuration wizard. Always recoverable:
/// the wizard prints the message and asks again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValidationError {
    InvalidPort(String),
    InvalidChoice(String),
    MalformedCredential(String),
    EmptyCredentialField,
    InvalidUsername(String),
    DuplicateUser(String),
    NoUsers,
}

impl fmt::Display for InputValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValidationError::InvalidPort(p) => {
                write!(f, "Invalid port '{}': enter a number between 1 and 65535", p)
            }
            InputValidationError::InvalidChoice(c) => {
                write!(f, "Invalid answer '{}': please enter y or n", c)
            }
            InputValidationError::MalformedCredential(_) => {
                write!(f, "Malformed entry: use the format 'username:password'")
            }
            InputValidationError::EmptyCredentialField => {
                write!(f, "Username and password must not be empty")
            }
            InputValidationError::InvalidUsername(u) => write!(f, "Invalid username: {}", u),
            InputValidationError::DuplicateUser(u) => write!(f, "User already added: {}", u),
            InputValidationError::NoUsers => write!(f, "At least one user is required"),
        }
    }
}

impl std::error::Error for InputValidationError {}

/// User-list file errors
#[derive(Debug)]
pub enum UserFileError {
    Io(PathBuf, io::Error),
    MalformedLine { line: usize, reason: String },
}

impl fmt::Display for UserFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserFileError::Io(path, e) => write!(f, "User file {}: {}", path.display(), e),
            UserFileError::MalformedLine { line, reason } => {
                write!(f, "User file line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for UserFileError {}

/// Wizard termination errors (never raised for bad input, only for I/O)
#[derive(Debug)]
pub enum WizardError {
    InputClosed,
    Io(io::Error),
    Persist(UserFileError),
}

impl fmt::Display for WizardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardError::InputClosed => write!(f, "Input closed before configuration completed"),
            WizardError::Io(e) => write!(f, "Console I/O error: {}", e),
            WizardError::Persist(e) => write!(f, "Failed to save user list: {}", e),
        }
    }
}

impl std::error::Error for WizardError {}

impl From<io::Error> for WizardError {
    fn from(error: io::Error) -> Self {
        WizardError::Io(error)
    }
}

impl From<UserFileError> for WizardError {
    fn from(error: UserFileError) -> Self {
        WizardError::Persist(error)
    }
}

/// Filesystem provisioning errors (fatal at startup)
#[derive(Debug)]
pub enum ProvisionError {
    CreateDirectory(PathBuf, io::Error),
    InvalidUsername(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::CreateDirectory(path, e) => {
                write!(f, "Failed to create directory {}: {}", path.display(), e)
            }
            ProvisionError::InvalidUsername(u) => {
                write!(f, "Username cannot be used as a directory name: {}", u)
            }
        }
    }
}

impl std::error::Error for ProvisionError {}

/// Certificate bootstrap and loading errors (fatal at startup)
#[derive(Debug)]
pub enum CertificateGenerationError {
    Crypto(String),
    Io(PathBuf, io::Error),
    InvalidMaterial(String),
}

impl fmt::Display for CertificateGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertificateGenerationError::Crypto(e) => write!(f, "Crypto failure: {}", e),
            CertificateGenerationError::Io(path, e) => {
                write!(f, "Certificate file {}: {}", path.display(), e)
            }
            CertificateGenerationError::InvalidMaterial(e) => {
                write!(f, "Invalid certificate material: {}", e)
            }
        }
    }
}

impl std::error::Error for CertificateGenerationError {}

impl From<rcgen::Error> for CertificateGenerationError {
    fn from(error: rcgen::Error) -> Self {
        CertificateGenerationError::Crypto(error.to_string())
    }
}

impl From<rustls::Error> for CertificateGenerationError {
    fn from(error: rustls::Error) -> Self {
        CertificateGenerationError::InvalidMaterial(error.to_string())
    }
}

/// A listener could not be bound
#[derive(Debug)]
pub struct ListenerBindError {
    pub addr: SocketAddr,
    pub source: io::Error,
}

impl fmt::Display for ListenerBindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to bind {}: {}", self.addr, self.source)
    }
}

impl std::error::Error for ListenerBindError {}

/// Per-connection errors. Logged by the engine, never escalated.
#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    TlsHandshake(io::Error),
    NoPassivePort,
    NoDataConnection,
    DataConnectionTimeout,
    ForeignDataPeer(SocketAddr),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
            SessionError::TlsHandshake(e) => write!(f, "TLS handshake failed: {}", e),
            SessionError::NoPassivePort => write!(f, "No free port in the passive range"),
            SessionError::NoDataConnection => write!(f, "Use PASV first"),
            SessionError::DataConnectionTimeout => write!(f, "Timed out waiting for data connection"),
            SessionError::ForeignDataPeer(addr) => {
                write!(f, "Data connection from unexpected peer {}", addr)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        SessionError::Io(error)
    }
}

/// Top-level error for everything that can abort startup
#[derive(Debug)]
pub enum FtpdError {
    Settings(config::ConfigError),
    Wizard(WizardError),
    UserFile(UserFileError),
    InvalidConfig(InputValidationError),
    Provision(ProvisionError),
    Certificate(CertificateGenerationError),
    Bind(ListenerBindError),
    Logging(String),
}

impl fmt::Display for FtpdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpdError::Settings(e) => write!(f, "Settings error: {}", e),
            FtpdError::Wizard(e) => write!(f, "Configuration wizard error: {}", e),
            FtpdError::UserFile(e) => write!(f, "User list error: {}", e),
            FtpdError::InvalidConfig(e) => write!(f, "Invalid configuration: {}", e),
            FtpdError::Provision(e) => write!(f, "Provisioning error: {}", e),
            FtpdError::Certificate(e) => write!(f, "Certificate error: {}", e),
            FtpdError::Bind(e) => write!(f, "Listener error: {}", e),
            FtpdError::Logging(e) => write!(f, "Logging setup error: {}", e),
        }
    }
}

impl std::error::Error for FtpdError {}

impl From<config::ConfigError> for FtpdError {
    fn from(error: config::ConfigError) -> Self {
        FtpdError::Settings(error)
    }
}

impl From<WizardError> for FtpdError {
    fn from(error: WizardError) -> Self {
        FtpdError::Wizard(error)
    }
}

impl From<UserFileError> for FtpdError {
    fn from(error: UserFileError) -> Self {
        FtpdError::UserFile(error)
    }
}

impl From<InputValidationError> for FtpdError {
    fn from(error: InputValidationError) -> Self {
        FtpdError::InvalidConfig(error)
    }
}

impl From<ProvisionError> for FtpdError {
    fn from(error: ProvisionError) -> Self {
        FtpdError::Provision(error)
    }
}

impl From<CertificateGenerationError> for FtpdError {
    fn from(error: CertificateGenerationError) -> Self {
        FtpdError::Certificate(error)
    }
}

impl From<ListenerBindError> for FtpdError {
    fn from(error: ListenerBindError) -> Self {
        FtpdError::Bind(error)
    }
}

//! Error handlers
//!
//! Maps errors to process exit codes, log lines and FTP reply codes.

use crate::error::types::{FtpdError, SessionError};
use log::error;

/// Log a fatal startup error
pub fn report(err: &FtpdError) {
    error!("Startup aborted: {}", err);
}

/// Process exit status for a fatal startup error
pub fn exit_code(err: &FtpdError) -> i32 {
    match err {
        FtpdError::Settings(_) => 2,
        FtpdError::InvalidConfig(_) => 2,
        FtpdError::Wizard(_) => 3,
        FtpdError::UserFile(_) => 3,
        FtpdError::Provision(_) => 4,
        FtpdError::Certificate(_) => 5,
        FtpdError::Bind(_) => 6,
        FtpdError::Logging(_) => 1,
    }
}

/// Convert a session error to an FTP reply code
pub fn error_to_ftp_code(err: &SessionError) -> u16 {
    match err {
        SessionError::Io(_) => 451,
        SessionError::TlsHandshake(_) => 522,
        SessionError::NoPassivePort => 425,
        SessionError::NoDataConnection => 425,
        SessionError::DataConnectionTimeout => 425,
        SessionError::ForeignDataPeer(_) => 425,
    }
}

/// Render a session error as a complete FTP reply line
pub fn error_to_reply(err: &SessionError) -> String {
    format!("{} {}\r\n", error_to_ftp_code(err), err)
}

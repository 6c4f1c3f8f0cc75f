//! Module `commands`
//!
//! Defines the control-channel command set understood by the engine and the
//! parser that turns a raw line into a `Command`.

use std::fmt;

/// Represents an FTP command parsed from the client input.
///
/// Commands that require arguments store them as `String` variants.
#[derive(Debug, PartialEq)]
pub enum Command {
    USER(String),
    PASS(String),
    AUTH(String),
    PBSZ(String),
    PROT(String),
    SYST,
    FEAT,
    NOOP,
    PWD,
    CWD(String),
    CDUP,
    TYPE(String),
    PASV,
    LIST(Option<String>),
    NLST(Option<String>),
    RETR(String),
    STOR(String),
    APPE(String),
    DELE(String),
    MKD(String),
    RMD(String),
    RNFR(String),
    RNTO(String),
    QUIT,
    /// Known command missing its required argument
    SYNTAX(String),
    UNKNOWN(String),
}

impl Command {
    /// Commands a client may send before upgrading to TLS when TLS is required
    pub fn allowed_before_tls(&self) -> bool {
        matches!(
            self,
            Command::AUTH(_) | Command::FEAT | Command::SYST | Command::NOOP | Command::QUIT
        )
    }

    /// Commands that need an authenticated session
    pub fn requires_login(&self) -> bool {
        !matches!(
            self,
            Command::USER(_)
                | Command::PASS(_)
                | Command::AUTH(_)
                | Command::PBSZ(_)
                | Command::PROT(_)
                | Command::SYST
                | Command::FEAT
                | Command::NOOP
                | Command::QUIT
                | Command::SYNTAX(_)
                | Command::UNKNOWN(_)
        )
    }

    /// Commands that open a data connection
    pub fn uses_data_channel(&self) -> bool {
        matches!(
            self,
            Command::PASV
                | Command::LIST(_)
                | Command::NLST(_)
                | Command::RETR(_)
                | Command::STOR(_)
                | Command::APPE(_)
        )
    }
}

/// Log-safe rendering; PASS arguments are never printed
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PASS(_) => write!(f, "PASS ********"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Parses a raw command line received from a client into the `Command` enum.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_end_matches(['\r', '\n']).trim_start();
    let mut parts = trimmed.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();

    let required = |build: fn(String) -> Command| {
        if arg.is_empty() {
            Command::SYNTAX(cmd.clone())
        } else {
            build(arg.to_string())
        }
    };
    let optional = || (!arg.is_empty()).then(|| arg.to_string());

    match cmd.as_str() {
        "USER" => required(Command::USER),
        // Anonymous clients may send an empty password
        "PASS" => Command::PASS(arg.to_string()),
        "AUTH" => required(Command::AUTH),
        "PBSZ" => required(Command::PBSZ),
        "PROT" => required(Command::PROT),
        "SYST" => Command::SYST,
        "FEAT" => Command::FEAT,
        "NOOP" => Command::NOOP,
        "PWD" | "XPWD" => Command::PWD,
        "CWD" | "XCWD" => required(Command::CWD),
        "CDUP" | "XCUP" => Command::CDUP,
        "TYPE" => required(Command::TYPE),
        "PASV" => Command::PASV,
        "LIST" => Command::LIST(optional()),
        "NLST" => Command::NLST(optional()),
        "RETR" => required(Command::RETR),
        "STOR" => required(Command::STOR),
        "APPE" => required(Command::APPE),
        "DELE" => required(Command::DELE),
        "MKD" | "XMKD" => required(Command::MKD),
        "RMD" | "XRMD" => required(Command::RMD),
        "RNFR" => required(Command::RNFR),
        "RNTO" => required(Command::RNTO),
        "QUIT" => Command::QUIT,
        _ => Command::UNKNOWN(cmd.clone()),
    }
}

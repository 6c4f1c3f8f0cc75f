//! Credential storage and management
//!
//! Handles the user-list file: `username:password` lines, `#` comments,
//! blank lines ignored. Saving always rewrites the whole file.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::UserFileError;

/// A username/password pair as entered by the operator
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

impl UserCredential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse a `username:password` entry, splitting on the first colon
    pub fn parse(entry: &str) -> Option<Self> {
        let (username, password) = entry.split_once(':')?;
        Some(Self::new(username, password))
    }
}

// Passwords must never end up in logs.
impl fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

const FILE_HEADER: &str = "# FTP user list\n# Format: username:password\n# Restart the server after editing\n\n";

/// Load credentials from a user-list file
pub fn load_users(path: &Path) -> Result<Vec<UserCredential>, UserFileError> {
    let content =
        fs::read_to_string(path).map_err(|e| UserFileError::Io(path.to_path_buf(), e))?;
    parse_users(&content)
}

/// Parse user-list content, preserving entry order
pub fn parse_users(content: &str) -> Result<Vec<UserCredential>, UserFileError> {
    let mut users = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let credential = UserCredential::parse(line).ok_or_else(|| UserFileError::MalformedLine {
            line: index + 1,
            reason: "expected 'username:password'".into(),
        })?;

        if credential.username.is_empty() || credential.password.is_empty() {
            return Err(UserFileError::MalformedLine {
                line: index + 1,
                reason: "username and password must not be empty".into(),
            });
        }

        users.push(credential);
    }

    Ok(users)
}

/// Rewrite the user-list file with the given credentials
pub fn save_users(path: &Path, users: &[UserCredential]) -> Result<(), UserFileError> {
    let io_err = |e| UserFileError::Io(path.to_path_buf(), e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(FILE_HEADER.as_bytes()).map_err(io_err)?;
    for user in users {
        writeln!(file, "{}:{}", user.username, user.password).map_err(io_err)?;
    }
    file.sync_all().map_err(io_err)?;

    info!("Saved {} user(s) to {}", users.len(), path.display());
    Ok(())
}

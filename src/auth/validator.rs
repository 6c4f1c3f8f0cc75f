//! Authentication validator
//!
//! Implements FTP username and password validation against the provisioned
//! authorization table.

use super::provision::{Account, AuthorizationTable};
use crate::config::ANONYMOUS_LOGINS;

/// Result of a USER command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCheck {
    PasswordRequired,
    Anonymous,
    Unknown,
}

/// Performs basic input sanitation to check for malicious or malformed input.
fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

const MAX_CREDENTIAL_LENGTH: usize = 256;

fn is_anonymous_login(username: &str) -> bool {
    ANONYMOUS_LOGINS
        .iter()
        .any(|login| login.eq_ignore_ascii_case(username))
}

/// Classifies a username before the password arrives.
pub fn validate_user(table: &AuthorizationTable, username: &str) -> UserCheck {
    if !is_valid_input(username, MAX_CREDENTIAL_LENGTH) {
        return UserCheck::Unknown;
    }

    if is_anonymous_login(username) && table.anonymous().is_some() {
        return UserCheck::Anonymous;
    }

    // Unknown users still get asked for a password so names cannot be probed.
    UserCheck::PasswordRequired
}

/// Validates the password for `username` and returns the account on success.
pub fn validate_password<'a>(
    table: &'a AuthorizationTable,
    username: &str,
    password: &str,
) -> Option<&'a Account> {
    if is_anonymous_login(username) {
        return table.anonymous();
    }

    if !is_valid_input(password, MAX_CREDENTIAL_LENGTH) {
        return None;
    }

    table
        .user(username)
        .filter(|account| account.password_matches(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{UserCredential, provision};
    use crate::config::{ServerConfig, Settings};

    fn table(anonymous: bool) -> (tempfile::TempDir, AuthorizationTable) {
        let dir = tempfile::tempdir().unwrap();
        let users = if anonymous {
            vec![]
        } else {
            vec![UserCredential::new("alice", "secret")]
        };
        let config = ServerConfig::new(
            2121,
            anonymous,
            users,
            dir.path().to_path_buf(),
            false,
            &Settings::default(),
        );
        let table = provision(&config).unwrap();
        (dir, table)
    }

    #[test]
    fn registered_user_logs_in_with_correct_password() {
        let (_dir, table) = table(false);
        assert_eq!(validate_user(&table, "alice"), UserCheck::PasswordRequired);
        assert!(validate_password(&table, "alice", "secret").is_some());
        assert!(validate_password(&table, "alice", "wrong").is_none());
        assert!(validate_password(&table, "mallory", "secret").is_none());
    }

    #[test]
    fn anonymous_only_when_enabled() {
        let (_dir, closed) = table(false);
        assert_eq!(validate_user(&closed, "anonymous"), UserCheck::PasswordRequired);
        assert!(validate_password(&closed, "anonymous", "guest@").is_none());

        let (_dir, open) = table(true);
        assert_eq!(validate_user(&open, "Anonymous"), UserCheck::Anonymous);
        assert!(validate_password(&open, "ftp", "").is_some());
    }

    #[test]
    fn control_characters_are_rejected() {
        let (_dir, table) = table(false);
        assert_eq!(validate_user(&table, "al\0ice"), UserCheck::Unknown);
        assert_eq!(validate_user(&table, "   "), UserCheck::Unknown);
    }
}

//! Authorization provisioning
//!
//! Creates home directories on disk and builds the authorization table the
//! transfer engine consults at login. Runs strictly before any listener binds.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::permissions::Permissions;
use crate::config::{ServerConfig, validate_username};
use crate::error::ProvisionError;

/// A provisioned login: password, home directory and permission set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    password: String,
    pub home: PathBuf,
    pub permissions: Permissions,
}

impl Account {
    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }
}

/// Read-only lookup table of every account allowed to log in
#[derive(Debug, Clone, Default)]
pub struct AuthorizationTable {
    pub(crate) anonymous: Option<Account>,
    pub(crate) users: HashMap<String, Account>,
}

impl AuthorizationTable {
    pub fn user(&self, username: &str) -> Option<&Account> {
        self.users.get(username)
    }

    pub fn anonymous(&self) -> Option<&Account> {
        self.anonymous.as_ref()
    }
}

/// Create every home directory and return the resulting authorization table.
///
/// Existing directories and their contents are left untouched, so calling this
/// repeatedly with the same configuration is safe.
pub fn provision(config: &ServerConfig) -> Result<AuthorizationTable, ProvisionError> {
    ensure_directory(&config.base_dir)?;

    let mut table = AuthorizationTable::default();

    if config.anonymous.enabled {
        ensure_directory(&config.anonymous.directory)?;
        info!(
            "Anonymous access enabled: {} [{}]",
            config.anonymous.directory.display(),
            Permissions::READ_ONLY
        );
        table.anonymous = Some(Account {
            username: "anonymous".to_string(),
            password: String::new(),
            home: config.anonymous.directory.clone(),
            permissions: Permissions::READ_ONLY,
        });
    }

    for user in &config.users {
        validate_username(&user.username)
            .map_err(|_| ProvisionError::InvalidUsername(user.username.clone()))?;

        let home = config.base_dir.join(&user.username);
        ensure_directory(&home)?;
        info!(
            "Provisioned user {}: {} [{}]",
            user.username,
            home.display(),
            Permissions::FULL
        );

        table.users.insert(
            user.username.clone(),
            Account {
                username: user.username.clone(),
                password: user.password.clone(),
                home,
                permissions: Permissions::FULL,
            },
        );
    }

    Ok(table)
}

fn ensure_directory(path: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(path).map_err(|e| ProvisionError::CreateDirectory(path.to_path_buf(), e))
}

//! Configuration wizard state machine
//!
//! Each state owns one prompt. Invalid answers keep the machine in the same
//! state and print the validation message; nothing the operator types can
//! abort the wizard.

use std::io::Write;
use std::path::PathBuf;

use log::info;

use super::input::InputSource;
use crate::auth::UserCredential;
use crate::auth::credentials::save_users;
use crate::config::{DEFAULT_CONTROL_PORT, ServerConfig, Settings, validate_username};
use crate::error::{InputValidationError, WizardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardState {
    AskPort,
    AskAnonymous,
    AskUsers,
    AskRootDir,
    AskTls,
    Done,
}

/// Answers collected so far
#[derive(Debug, Default)]
struct Draft {
    port: u16,
    anonymous: bool,
    users: Vec<UserCredential>,
    base_dir: PathBuf,
    tls: bool,
}

pub struct ConfigWizard<'a, I, W> {
    input: I,
    output: W,
    settings: &'a Settings,
    state: WizardState,
    draft: Draft,
}

impl<'a, I: InputSource, W: Write> ConfigWizard<'a, I, W> {
    pub fn new(input: I, output: W, settings: &'a Settings) -> Self {
        Self {
            input,
            output,
            settings,
            state: WizardState::AskPort,
            draft: Draft::default(),
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    /// Drive the wizard to completion and return the validated configuration.
    ///
    /// If users were entered, the user-list file is rewritten before returning.
    pub fn run(mut self) -> Result<ServerConfig, WizardError> {
        writeln!(self.output, "RAX FTP server setup\n")?;

        while self.state != WizardState::Done {
            write!(self.output, "{}", prompt(self.state))?;
            self.output.flush()?;

            let line = self.input.next_line()?.ok_or(WizardError::InputClosed)?;
            match self.step(line.trim()) {
                Ok(next) => self.state = next,
                Err(e) => writeln!(self.output, "  ! {}", e)?,
            }
        }

        let draft = self.draft;
        if !draft.users.is_empty() {
            save_users(&self.settings.users_path(), &draft.users)?;
            writeln!(
                self.output,
                "Users saved to {}",
                self.settings.users_path().display()
            )?;
        }

        let config = ServerConfig::new(
            draft.port,
            draft.anonymous,
            draft.users,
            draft.base_dir,
            draft.tls,
            self.settings,
        );
        info!(
            "Configuration complete: port {}, anonymous {}, {} user(s), root {}, TLS {}",
            config.port,
            config.anonymous.enabled,
            config.users.len(),
            config.base_dir.display(),
            config.tls
        );
        Ok(config)
    }

    /// Apply one answer to the current state and return the next state
    pub fn step(&mut self, answer: &str) -> Result<WizardState, InputValidationError> {
        match self.state {
            WizardState::AskPort => {
                self.draft.port = parse_port(answer)?;
                if self.settings.port_range().contains(self.draft.port) {
                    return Err(InputValidationError::InvalidPort(format!(
                        "{} is inside the passive range {}",
                        answer,
                        self.settings.port_range()
                    )));
                }
                Ok(WizardState::AskAnonymous)
            }
            WizardState::AskAnonymous => {
                self.draft.anonymous = parse_yes_no(answer)?;
                if self.draft.anonymous {
                    Ok(WizardState::AskRootDir)
                } else {
                    Ok(WizardState::AskUsers)
                }
            }
            WizardState::AskUsers => {
                if answer.is_empty() {
                    if self.draft.users.is_empty() {
                        return Err(InputValidationError::NoUsers);
                    }
                    return Ok(WizardState::AskRootDir);
                }

                let user = parse_credential(answer)?;
                if self.draft.users.iter().any(|u| u.username == user.username) {
                    return Err(InputValidationError::DuplicateUser(user.username));
                }
                self.draft.users.push(user);
                Ok(WizardState::AskUsers)
            }
            WizardState::AskRootDir => {
                self.draft.base_dir = if answer.is_empty() {
                    default_root_dir()
                } else {
                    expand_root(answer)
                };
                Ok(WizardState::AskTls)
            }
            WizardState::AskTls => {
                self.draft.tls = parse_yes_no(answer)?;
                Ok(WizardState::Done)
            }
            WizardState::Done => Ok(WizardState::Done),
        }
    }
}

fn prompt(state: WizardState) -> String {
    match state {
        WizardState::AskPort => format!("FTP control port [default: {}]: ", DEFAULT_CONTROL_PORT),
        WizardState::AskAnonymous => {
            "Enable anonymous access? (y/N) [anonymous is read-only]: ".to_string()
        }
        WizardState::AskUsers => "Add user as username:password (blank to finish): ".to_string(),
        WizardState::AskRootDir => format!(
            "FTP root directory [default: {}]: ",
            default_root_dir().display()
        ),
        WizardState::AskTls => "Require FTPS (TLS)? (y/N): ".to_string(),
        WizardState::Done => String::new(),
    }
}

/// Blank means the default port; otherwise a decimal literal in 1..=65535
pub fn parse_port(answer: &str) -> Result<u16, InputValidationError> {
    if answer.is_empty() {
        return Ok(DEFAULT_CONTROL_PORT);
    }

    if !answer.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InputValidationError::InvalidPort(answer.to_string()));
    }

    match answer.parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(InputValidationError::InvalidPort(answer.to_string())),
    }
}

/// Case-insensitive y/yes/n/no; blank means no
pub fn parse_yes_no(answer: &str) -> Result<bool, InputValidationError> {
    match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => Ok(true),
        "n" | "no" | "" => Ok(false),
        _ => Err(InputValidationError::InvalidChoice(answer.to_string())),
    }
}

pub fn parse_credential(answer: &str) -> Result<UserCredential, InputValidationError> {
    let user = UserCredential::parse(answer)
        .ok_or_else(|| InputValidationError::MalformedCredential(answer.to_string()))?;

    if user.username.is_empty() || user.password.is_empty() {
        return Err(InputValidationError::EmptyCredentialField);
    }

    validate_username(&user.username)?;
    Ok(user)
}

pub fn default_root_dir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\wwwftp")
    } else {
        PathBuf::from("/srv/ftp")
    }
}

/// Expand `~` and environment variables; undefined variables are left as typed
pub fn expand_root(raw: &str) -> PathBuf {
    let expanded = match shellexpand::full(raw) {
        Ok(path) => path,
        Err(_) => shellexpand::tilde(raw),
    };
    PathBuf::from(expanded.into_owned())
}

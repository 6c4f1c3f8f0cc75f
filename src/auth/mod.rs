//! Authentication and authorization
//!
//! Handles the persisted user list, permission sets, home-directory
//! provisioning and login validation.

pub mod credentials;
pub mod permissions;
pub mod provision;
pub mod validator;

pub use credentials::UserCredential;
pub use permissions::Permissions;
pub use provision::{Account, AuthorizationTable, provision};
pub use validator::{UserCheck, validate_password, validate_user};

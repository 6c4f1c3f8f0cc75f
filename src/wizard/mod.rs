//! Interactive configuration wizard
//!
//! Collects the control port, anonymous policy, user list, root directory and
//! TLS choice from an abstract line source.

pub mod input;
pub mod state;

pub use input::{ConsoleInput, InputSource, ScriptedInput};
pub use state::{ConfigWizard, WizardState, default_root_dir, expand_root};

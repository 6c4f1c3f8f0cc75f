//! TLS bootstrap
//!
//! Makes sure a certificate exists before the engine starts and turns it into
//! a `tokio-rustls` acceptor.

pub mod acceptor;
pub mod bootstrap;

pub use acceptor::load_acceptor;
pub use bootstrap::{TlsMaterial, ensure_certificate};

//! RAX FTPD - Entry Point
//!
//! Collects the configuration (wizard or unattended), provisions accounts,
//! bootstraps TLS and serves FTP plus the monitoring page until Ctrl-C.

use log::{error, info};

use rax_ftpd::config::{ServerConfig, Settings};
use rax_ftpd::error::handlers::{exit_code, report};
use rax_ftpd::error::{FtpdError, WizardError};
use rax_ftpd::wizard::{ConfigWizard, ConsoleInput};
use rax_ftpd::{logging, server};

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            report(&e);
            if let FtpdError::Logging(_) = e {
                eprintln!("{}", e);
            }
            exit_code(&e)
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<(), FtpdError> {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            // Still get the failure into the default log file
            let defaults = Settings::default();
            if let Err(log_err) = logging::init(&defaults.log_path(), defaults.log_retain_days) {
                eprintln!("Cannot set up logging: {}", log_err);
            }
            return Err(e.into());
        }
    };
    logging::init(&settings.log_path(), settings.log_retain_days).map_err(FtpdError::Logging)?;

    info!("Launching RAX FTP server...");

    let config = if settings.interactive {
        let wizard_settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            ConfigWizard::new(ConsoleInput, std::io::stdout(), &wizard_settings).run()
        })
        .await
        .map_err(|e| WizardError::Io(std::io::Error::other(e)))??
    } else {
        info!("Unattended start, reading users from {}", settings.users_file);
        ServerConfig::unattended(&settings)?
    };

    let service = server::start(config, &settings).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => error!("Cannot listen for Ctrl-C: {}", e),
    }

    service.shutdown().await;
    Ok(())
}

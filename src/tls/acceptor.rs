//! Loads the bootstrapped PEM file into a TLS acceptor for control and data channels

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::ring;
use tokio_rustls::TlsAcceptor;

use super::bootstrap::TlsMaterial;
use crate::error::CertificateGenerationError;

pub fn load_acceptor(material: &TlsMaterial) -> Result<TlsAcceptor, CertificateGenerationError> {
    let certs = read_certificates(&material.certificate_path)?;
    let key = read_private_key(&material.key_path)?;

    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, CertificateGenerationError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CertificateGenerationError::Io(path.to_path_buf(), e))
}

pub fn read_certificates(
    path: &Path,
) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, CertificateGenerationError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateGenerationError::Io(path.to_path_buf(), e))?;

    if certs.is_empty() {
        return Err(CertificateGenerationError::InvalidMaterial(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn read_private_key(
    path: &Path,
) -> Result<rustls::pki_types::PrivateKeyDer<'static>, CertificateGenerationError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| CertificateGenerationError::Io(path.to_path_buf(), e))?
        .ok_or_else(|| {
            CertificateGenerationError::InvalidMaterial(format!(
                "no private key found in {}",
                path.display()
            ))
        })
}

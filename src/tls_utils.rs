use crate::config::TlsConfig;
use crate::error::{CertificateError, HijackResult};
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Root store filled from the platform's native certificates.
///
/// Certificates that fail to load or parse are logged and skipped; an
/// empty store is still a valid store, it just fails every handshake.
pub fn native_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        warn!("Failed to load native root certificate: {}", e);
    }

    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(
        "Loaded {} native root certificates ({} ignored)",
        added, ignored
    );
    roots
}

/// Read every certificate from a PEM file
pub fn load_certificates<P: AsRef<Path>>(path: P) -> HijackResult<Vec<CertificateDer<'static>>> {
    let path_str = path.as_ref().display().to_string();
    if !path.as_ref().exists() {
        return Err(CertificateError::FileNotFound { path: path_str }.into());
    }

    let file = File::open(path.as_ref()).map_err(|e| CertificateError::LoadFailed {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::LoadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(CertificateError::NoCertificates { path: path_str }.into());
    }
    Ok(certs)
}

/// Client config trusting native roots only
pub fn default_client_config() -> ClientConfig {
    ClientConfig::builder()
        .with_root_certificates(native_root_store())
        .with_no_client_auth()
}

/// Build the rustls client config described by `config`
pub fn client_config(config: &TlsConfig) -> HijackResult<ClientConfig> {
    let mut roots = if config.native_roots {
        native_root_store()
    } else {
        RootCertStore::empty()
    };

    if let Some(ca_file) = &config.ca_file {
        for cert in load_certificates(ca_file)? {
            roots.add(cert).map_err(|e| CertificateError::LoadFailed {
                path: ca_file.clone(),
                reason: e.to_string(),
            })?;
        }
        debug!("Added CA certificates from {}", ca_file);
    }

    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

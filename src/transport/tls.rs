//! TLS for the TCP transport, configured from PEM files.
//!
//! The client trusts the certificates in its PEM file. The server reads its
//! certificate chain and private key from a single PEM file.

use crate::error::TransportError;
use anyhow::{Context, Result};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::{TlsAcceptor, TlsConnector};

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .with_context(|| format!("could not read certificates from {:?}", path))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("malformed certificate in {:?}", path))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {:?}", path);
    }
    Ok(certs)
}

/// Connector that trusts the certificates in `path`
pub fn client_connector(path: &Path) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .with_context(|| format!("unusable certificate in {:?}", path))?;
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Acceptor presenting the certificate chain and key stored in `path`
pub fn server_acceptor(path: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(path)?;
    let key = PrivateKeyDer::from_pem_file(path)
        .with_context(|| format!("could not read private key from {:?}", path))?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .with_context(|| format!("certificate and key in {:?} do not match", path))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Name the server certificate must match: the host part of `address`
pub(crate) fn server_name(address: &str) -> Result<ServerName<'static>, TransportError> {
    let host = match address.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => host,
        _ => address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|e| TransportError::Connect {
            address: address.to_string(),
            message: format!("invalid server name {:?}: {}", host, e),
        })
}

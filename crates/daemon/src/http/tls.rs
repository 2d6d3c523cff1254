//! Self-signed TLS for HTTPS serving.

use std::io;
use std::net::IpAddr;

use axum_server::tls_rustls::RustlsConfig;
use rcgen::generate_simple_self_signed;

/// Host names a generated certificate is valid for.
fn subject_alt_names(host: IpAddr) -> Vec<String> {
    let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
    if !host.is_unspecified() && !host.is_loopback() {
        names.push(host.to_string());
    }
    names
}

/// Generate a certificate and private key, both PEM encoded.
pub fn self_signed_pem(host: IpAddr) -> io::Result<(String, String)> {
    let certified = generate_simple_self_signed(subject_alt_names(host))
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
    Ok((certified.cert.pem(), certified.key_pair.serialize_pem()))
}

/// Rustls configuration with an in-memory self-signed certificate.
pub async fn self_signed_config(host: IpAddr) -> io::Result<RustlsConfig> {
    // Fails only when a provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (cert, key) = self_signed_pem(host)?;
    RustlsConfig::from_pem(cert.into_bytes(), key.into_bytes()).await
}

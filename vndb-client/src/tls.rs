//! TLS connector setup.

use crate::config::TlsConfig;
use crate::error::ClientError;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Creates a verifying TLS connector for `host`.
///
/// Trusts the webpki roots, or only the certificates in `ca_cert_path` when set.
pub fn create_tls_connector(
    config: &TlsConfig,
    host: &str,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    let mut roots = RootCertStore::empty();
    match config.ca_cert_path {
        Some(ref ca_path) => {
            for cert in load_certs(ca_path)? {
                roots
                    .add(cert)
                    .map_err(|e| ClientError::TlsConfig(format!("invalid CA cert: {}", e)))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok((
        TlsConnector::from(Arc::new(client_config)),
        server_name(config, host)?,
    ))
}

/// Creates a TLS connector that accepts any server certificate.
/// WARNING: Only use for development/testing.
pub fn create_insecure_tls_connector(
    config: &TlsConfig,
    host: &str,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::UnixTime;
    use rustls::DigitallySignedStruct;

    #[derive(Debug)]
    struct AcceptAnyCert;

    impl ServerCertVerifier for AcceptAnyCert {
        fn verify_server_cert(
            &self,
            _: &CertificateDer<'_>,
            _: &[CertificateDer<'_>],
            _: &ServerName<'_>,
            _: &[u8],
            _: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _: &[u8],
            _: &CertificateDer<'_>,
            _: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            use rustls::SignatureScheme::*;
            vec![
                RSA_PKCS1_SHA256,
                RSA_PKCS1_SHA384,
                RSA_PKCS1_SHA512,
                ECDSA_NISTP256_SHA256,
                ECDSA_NISTP384_SHA384,
                RSA_PSS_SHA256,
                RSA_PSS_SHA384,
                RSA_PSS_SHA512,
                ED25519,
            ]
        }
    }

    let client_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();

    Ok((
        TlsConnector::from(Arc::new(client_config)),
        server_name(config, host)?,
    ))
}

fn server_name(config: &TlsConfig, host: &str) -> Result<ServerName<'static>, ClientError> {
    let name = config.server_name.as_deref().unwrap_or(host);
    ServerName::try_from(name.to_string())
        .map_err(|_| ClientError::TlsConfig(format!("invalid server name: {}", name)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let file = File::open(path)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open cert file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::TlsConfig(format!("invalid cert file {:?}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {:?}",
            path
        )));
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_invalid_cert_path() {
        let result = load_certs(Path::new("/nonexistent/ca.pem"));
        assert!(result.unwrap_err().to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_empty_cert_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let result = load_certs(file.path());
        assert!(result.unwrap_err().to_string().contains("no certificates"));
    }

    #[test]
    fn test_server_name_defaults_to_host() {
        let config = TlsConfig::default();
        let name = server_name(&config, "api.vndb.org").unwrap();
        assert_eq!(name, ServerName::try_from("api.vndb.org").unwrap());

        let config = TlsConfig {
            server_name: Some("vndb.example".into()),
            ..TlsConfig::default()
        };
        assert_eq!(
            server_name(&config, "127.0.0.1").unwrap(),
            ServerName::try_from("vndb.example").unwrap()
        );
    }

    #[test]
    fn test_invalid_server_name() {
        let result = server_name(&TlsConfig::default(), "not a host name");
        assert!(matches!(result, Err(ClientError::TlsConfig(_))));
    }

    #[test]
    fn test_webpki_connector() {
        assert!(create_tls_connector(&TlsConfig::default(), "api.vndb.org").is_ok());
    }
}

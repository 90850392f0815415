//! rustls client configuration.

use loadgen_core::{ClientError, TlsConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_platform_verifier::BuilderVerifierExt;
use std::path::Path;
use std::sync::Arc;

fn tls_err(context: &str, err: impl std::fmt::Display) -> ClientError {
    ClientError::Tls(format!("{context}: {err}"))
}

/// Build the shared client configuration for every TLS connection of a run.
pub(crate) fn client_config(tls: &TlsConfig) -> Result<Arc<ClientConfig>, ClientError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_err("unsupported protocol versions", e))?;

    let builder = if !tls.verify_peer {
        tracing::warn!("TLS peer verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
    } else if let Some(ca_path) = &tls.ca_certs {
        builder.with_root_certificates(load_roots(ca_path)?)
    } else {
        builder
            .with_platform_verifier()
            .map_err(|e| tls_err("platform certificate verifier", e))?
    };

    let config = match (&tls.cert_file, &tls.key_file) {
        (Some(cert_path), Some(key_path)) => {
            let chain = load_certs(cert_path)?;
            let key = PrivateKeyDer::from_pem_file(key_path)
                .map_err(|e| tls_err(&format!("reading key {}", key_path.display()), e))?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| tls_err("client certificate", e))?
        }
        _ => builder.with_no_client_auth(),
    };
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let context = format!("reading certificates from {}", path.display());
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| tls_err(&context, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_err(&context, e))?;
    if certs.is_empty() {
        return Err(ClientError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore, ClientError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| tls_err(&format!("adding CA from {}", path.display()), e))?;
    }
    Ok(roots)
}

/// Resolve the name used for SNI and verification.
pub(crate) fn server_name(tls: &TlsConfig, host: &str) -> Result<ServerName<'static>, ClientError> {
    let name = tls.server_name.as_deref().unwrap_or(host);
    ServerName::try_from(name.to_string()).map_err(|e| tls_err(&format!("server name '{name}'"), e))
}

/// Verifier used when peer verification is switched off. Signatures are
/// still checked so the handshake itself stays sound.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insecure_config_builds() {
        let tls = TlsConfig {
            enabled: true,
            verify_peer: false,
            ..Default::default()
        };
        assert!(client_config(&tls).is_ok());
    }

    #[test]
    fn test_missing_ca_file_is_tls_error() {
        let tls = TlsConfig {
            enabled: true,
            ca_certs: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        let err = client_config(&tls).unwrap_err();
        assert!(matches!(err, ClientError::Tls(_)));
    }

    #[test]
    fn test_server_name_override() {
        let tls = TlsConfig {
            server_name: Some("cache.example.com".into()),
            ..Default::default()
        };
        let name = server_name(&tls, "10.0.0.5").unwrap();
        assert!(matches!(name, ServerName::DnsName(ref d) if d.as_ref() == "cache.example.com"));
        assert!(server_name(&TlsConfig::default(), "10.0.0.5").is_ok());
    }
}

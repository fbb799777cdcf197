//! Certificate trust override
//!
//! Test gateways run with self-signed certificates. Instead of the
//! platform trust store, connections accept either any certificate or
//! only the one whose SHA-1 fingerprint matches the configured
//! `davmail.server.certificate.hash`. Handshake signatures are still
//! checked.

use crate::error::{Error, Result};
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use sha1::{Digest, Sha1};
use std::fmt::{self, Write as _};
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

const SHA1_HEX_LEN: usize = 40;

static REGISTERED: OnceLock<TrustOverride> = OnceLock::new();

/// A SHA-1 certificate fingerprint, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateHash(String);

impl CertificateHash {
    /// Parse a fingerprint written as hex digits.
    ///
    /// `:` and space separators are ignored and case does not matter, so
    /// both `AB:CD:..` and `abcd..` forms are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the input holds exactly 40 hex
    /// digits.
    pub fn parse(input: &str) -> Result<Self> {
        let hex: String = input
            .chars()
            .filter(|c| !matches!(c, ':' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if hex.len() != SHA1_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::Config(format!(
                "Invalid certificate hash '{input}': expected {SHA1_HEX_LEN} hex digits"
            )));
        }
        Ok(Self(hex))
    }

    /// Fingerprint of a DER-encoded certificate.
    #[must_use]
    pub fn of_certificate(der: &[u8]) -> Self {
        let digest = Sha1::digest(der);
        let hex = digest
            .iter()
            .fold(String::with_capacity(SHA1_HEX_LEN), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            });
        Self(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which server certificates a connection accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Any certificate, as long as the handshake signature verifies.
    AcceptAny,
    /// Only the certificate with this fingerprint.
    Pinned(CertificateHash),
}

impl TrustPolicy {
    /// Policy for an optional configured hash. Missing or blank means
    /// [`TrustPolicy::AcceptAny`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the hash is malformed.
    pub fn from_hash(hash: Option<&str>) -> Result<Self> {
        match hash.map(str::trim) {
            None | Some("") => Ok(Self::AcceptAny),
            Some(hash) => CertificateHash::parse(hash).map(Self::Pinned),
        }
    }

    fn accepts(&self, end_entity: &CertificateDer<'_>) -> bool {
        match self {
            Self::AcceptAny => true,
            Self::Pinned(expected) => {
                let actual = CertificateHash::of_certificate(end_entity.as_ref());
                if &actual != expected {
                    debug!("Certificate {} does not match pinned {}", actual, expected);
                }
                &actual == expected
            }
        }
    }
}

impl fmt::Display for TrustPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcceptAny => f.write_str("accept any certificate"),
            Self::Pinned(hash) => write!(f, "pinned sha1 {hash}"),
        }
    }
}

/// A TLS client configuration carrying a [`TrustPolicy`].
#[derive(Debug, Clone)]
pub struct TrustOverride {
    policy: TrustPolicy,
    config: Arc<ClientConfig>,
}

impl TrustOverride {
    /// Build the client configuration for `policy` with the ring provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the provider rejects the default
    /// protocol versions.
    pub fn new(policy: TrustPolicy) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = OverrideVerifier {
            policy: policy.clone(),
            algorithms: provider.signature_verification_algorithms,
        };

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("Unsupported protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Self {
            policy,
            config: Arc::new(config),
        })
    }

    #[must_use]
    pub const fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config())
    }

    /// Open a TLS connection to `host:port` under this policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection fails or the handshake is
    /// rejected, including a certificate that does not match the pin.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
        debug!("Connecting to {}:{} ({})", host, port, self.policy);

        let tcp_stream = TcpStream::connect((host, port)).await?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

        self.connector()
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))
    }

    /// Handshake with `host:port` and return the server certificate's
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server presents no
    /// certificate.
    pub async fn probe(&self, host: &str, port: u16) -> Result<CertificateHash> {
        let mut stream = self.connect(host, port).await?;

        let hash = {
            let (_, connection) = stream.get_ref();
            let leaf = connection
                .peer_certificates()
                .and_then(|certs| certs.first())
                .ok_or_else(|| Error::Tls("Server sent no certificate".into()))?;
            CertificateHash::of_certificate(leaf.as_ref())
        };

        stream.shutdown().await.ok();
        Ok(hash)
    }
}

/// Install `policy` as the process-wide trust override.
///
/// Idempotent: the first registration wins. A later call with a
/// different policy keeps the existing override and logs a warning.
/// The ring provider is also installed as the process default so other
/// rustls users in the process share it.
///
/// # Errors
///
/// Returns an error if the client configuration cannot be built.
pub fn register(policy: TrustPolicy) -> Result<&'static TrustOverride> {
    if let Some(existing) = REGISTERED.get() {
        if existing.policy != policy {
            warn!(
                "Trust override already registered ({}), ignoring {}",
                existing.policy, policy
            );
        }
        return Ok(existing);
    }

    let candidate = TrustOverride::new(policy.clone())?;
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut fresh = false;
    let registered = REGISTERED.get_or_init(|| {
        fresh = true;
        candidate
    });

    if fresh {
        info!("Registered certificate trust override: {}", registered.policy);
    } else if registered.policy != policy {
        warn!(
            "Trust override already registered ({}), ignoring {}",
            registered.policy, policy
        );
    }
    Ok(registered)
}

/// The process-wide trust override, if one was registered.
#[must_use]
pub fn registered() -> Option<&'static TrustOverride> {
    REGISTERED.get()
}

#[derive(Debug)]
struct OverrideVerifier {
    policy: TrustPolicy,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for OverrideVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.policy.accepts(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

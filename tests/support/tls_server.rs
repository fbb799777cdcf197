//! In-process TLS endpoint for trust override tests
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   TLS handshake with a freshly generated self-signed certificate
//!       |
//!   Server sends greeting: "* OK DavMail test gateway ready\r\n"
//!       |
//!   Server closes the connection
//! ```
//!
//! The certificate's SHA-1 fingerprint is exposed so tests can pin it
//! (or deliberately pin something else).

use davmail_testkit::CertificateHash;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

pub const GREETING: &str = "* OK DavMail test gateway ready\r\n";

/// A TLS server on localhost with an OS-assigned port.
pub struct FakeTlsServer {
    port: u16,
    fingerprint: CertificateHash,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeTlsServer {
    /// Bind `127.0.0.1:0`, generate a certificate via `rcgen` and
    /// start accepting connections.
    pub async fn start() -> Self {
        // Multiple tests may race to install the provider.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");

        let cert_der = cert.cert.der().clone();
        let fingerprint = CertificateHash::of_certificate(cert_der.as_ref());
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor).await;
                });
            }
        });

        Self {
            port,
            fingerprint,
            _handle: handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// SHA-1 fingerprint of the server certificate.
    pub const fn fingerprint(&self) -> &CertificateHash {
        &self.fingerprint
    }
}

async fn handle_connection(stream: TcpStream, acceptor: TlsAcceptor) {
    // A rejected handshake simply ends the connection.
    let Ok(mut tls_stream) = acceptor.accept(stream).await else {
        return;
    };

    if tls_stream.write_all(GREETING.as_bytes()).await.is_err() {
        return;
    }
    let _ = tls_stream.shutdown().await;
}

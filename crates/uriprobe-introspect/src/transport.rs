//! TCP and TLS plumbing for the hand-rolled RESP and SMTP clients.

use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use uriprobe_core::BackendError;

/// Byte stream the wire clients read and write.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

/// Open a TCP connection, wrapped in TLS when `tls` is set.
pub async fn open(
    host: &str,
    port: u16,
    tls: bool,
    connect_timeout: Duration,
    accept_invalid_certs: bool,
) -> Result<BoxedStream, BackendError> {
    let tcp = timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| BackendError::Timeout(format!("connect to {host}:{port}")))?
        .map_err(|err| BackendError::from_io(&err))?;
    let _ = tcp.set_nodelay(true);

    if !tls {
        return Ok(Box::new(tcp));
    }

    let connector = TlsConnector::from(client_config(accept_invalid_certs)?);
    let name = ServerName::try_from(host.to_string())
        .map_err(|_| BackendError::Protocol(format!("invalid TLS server name: {host}")))?;
    let stream = timeout(connect_timeout, connector.connect(name, tcp))
        .await
        .map_err(|_| BackendError::Timeout(format!("TLS handshake with {host}:{port}")))?
        .map_err(|err| BackendError::from_io(&err))?;
    Ok(Box::new(stream))
}

/// True when a plain TCP connection can be opened within `connect_timeout`.
pub async fn reachable(host: &str, port: u16, connect_timeout: Duration) -> bool {
    matches!(
        timeout(connect_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// First address the host resolves to.
pub async fn resolve(host: &str, port: u16) -> Option<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, port)).await.ok()?;
    addrs.next().map(|addr| addr.ip())
}

fn client_config(accept_invalid_certs: bool) -> Result<Arc<ClientConfig>, BackendError> {
    static VERIFIED: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    static UNVERIFIED: OnceLock<Arc<ClientConfig>> = OnceLock::new();

    let slot = if accept_invalid_certs {
        &UNVERIFIED
    } else {
        &VERIFIED
    };
    if let Some(config) = slot.get() {
        return Ok(config.clone());
    }
    let config = Arc::new(build_client_config(accept_invalid_certs)?);
    Ok(slot.get_or_init(|| config).clone())
}

fn build_client_config(accept_invalid_certs: bool) -> Result<ClientConfig, BackendError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|err| BackendError::Protocol(format!("TLS setup: {err}")))?;

    if accept_invalid_certs {
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth());
    }

    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::debug!(event = "tls_roots_loaded", added, ignored, errors = native.errors.len());
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

/// Verifier that trusts any certificate. Only used when
/// `tls.accept_invalid_certs` is set.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

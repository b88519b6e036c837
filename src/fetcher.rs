use async_trait::async_trait;
use log::debug;
use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslVerifyMode};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::error::MonitorError;
use crate::target::Target;

/// Retrieves the raw leaf certificate presented by a target.
#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    async fn fetch(&self, target: &Target) -> Result<Vec<u8>, MonitorError>;
}

/// Fetches certificates over a real TLS handshake with chain verification turned off,
/// so expired and self-signed certificates are still returned.
pub struct TlsFetcher;

#[async_trait]
impl CertificateFetcher for TlsFetcher {
    async fn fetch(&self, target: &Target) -> Result<Vec<u8>, MonitorError> {
        let endpoint = target.endpoint();
        let timeout = target.timeout;
        let owned = target.clone();

        // DNS lookups can't be bounded from the blocking side, so the whole job is raced
        // against the target timeout as well.
        let job = tokio::task::spawn_blocking(move || fetch_leaf_certificate(&owned));
        match tokio::time::timeout(timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(MonitorError::connection(endpoint, e)),
            Err(_) => Err(MonitorError::Timeout { endpoint, timeout }),
        }
    }
}

/// Blocking fetch. The TCP stream is owned by this function (or the TLS stream wrapping it)
/// and is closed on every return path.
pub fn fetch_leaf_certificate(target: &Target) -> Result<Vec<u8>, MonitorError> {
    let endpoint = target.endpoint();
    let deadline = Instant::now() + target.timeout;
    let timed_out = || MonitorError::Timeout {
        endpoint: endpoint.clone(),
        timeout: target.timeout,
    };

    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| MonitorError::connection(&endpoint, format!("DNS resolution failed: {}", e)))?
        .collect();
    if addrs.is_empty() {
        return Err(MonitorError::connection(&endpoint, "DNS resolution returned no addresses"));
    }

    let stream = connect_before(&addrs, deadline).map_err(|e| {
        if is_timeout(&e) {
            timed_out()
        } else {
            MonitorError::connection(&endpoint, e)
        }
    })?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(timed_out());
    }
    stream
        .set_read_timeout(Some(remaining))
        .and_then(|_| stream.set_write_timeout(Some(remaining)))
        .map_err(|e| MonitorError::connection(&endpoint, e))?;

    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|e| MonitorError::connection(&endpoint, e))?;
    builder.set_verify(SslVerifyMode::NONE);
    let mut config = builder
        .build()
        .configure()
        .map_err(|e| MonitorError::connection(&endpoint, e))?;
    config.set_verify_hostname(false);

    let mut tls = match config.connect(&target.host, stream) {
        Ok(tls) => tls,
        Err(HandshakeError::WouldBlock(_)) => return Err(timed_out()),
        Err(HandshakeError::Failure(mid)) => {
            if mid.error().io_error().map(is_timeout).unwrap_or(false) {
                return Err(timed_out());
            }
            return Err(MonitorError::connection(
                &endpoint,
                format!("TLS handshake failed: {}", mid.error()),
            ));
        }
        Err(HandshakeError::SetupFailure(e)) => {
            return Err(MonitorError::connection(&endpoint, e));
        }
    };

    let der = tls
        .ssl()
        .peer_certificate()
        .ok_or_else(|| MonitorError::connection(&endpoint, "server presented no certificate"))
        .and_then(|cert| cert.to_der().map_err(|e| MonitorError::connection(&endpoint, e)));

    // Best effort close_notify; the socket is released when `tls` drops either way.
    if let Err(e) = tls.shutdown() {
        debug!("TLS shutdown with {} was not clean: {}", endpoint, e);
    }

    der
}

fn connect_before(addrs: &[SocketAddr], deadline: Instant) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "connect deadline exceeded"));
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address to connect to")))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

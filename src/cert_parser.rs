use chrono::{DateTime, Utc};
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};

use crate::error::MonitorError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
}

/// Decodes a leaf certificate into the fields the monitor cares about.
///
/// Accepts DER as returned by the fetcher, or a PEM `CERTIFICATE` block. The not-after
/// value is normalized to UTC whether the certificate encodes it as UTCTime or
/// GeneralizedTime.
pub fn parse(raw: &[u8]) -> Result<CertificateInfo, MonitorError> {
    let start = raw.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(raw.len());
    if raw[start..].starts_with(b"-----BEGIN") {
        let block = pem::parse(raw)
            .map_err(|e| MonitorError::MalformedCertificate(format!("invalid PEM: {}", e)))?;
        if block.tag() != "CERTIFICATE" {
            return Err(MonitorError::MalformedCertificate(format!(
                "expected a CERTIFICATE PEM block, found {}",
                block.tag()
            )));
        }
        return parse_der(block.contents());
    }
    parse_der(raw)
}

fn parse_der(der: &[u8]) -> Result<CertificateInfo, MonitorError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| MonitorError::MalformedCertificate(format!("failed to decode certificate: {}", e)))?;

    let common_name = first_common_name(cert.subject())
        .ok_or_else(|| MonitorError::MalformedCertificate("subject has no common name".to_string()))?;
    let issuer = first_common_name(cert.issuer())
        .ok_or_else(|| MonitorError::MalformedCertificate("issuer has no common name".to_string()))?;

    let not_after = cert.validity().not_after;
    let not_after = DateTime::<Utc>::from_timestamp(not_after.timestamp(), 0).ok_or_else(|| {
        MonitorError::MalformedCertificate(format!("not-after out of range: {}", not_after))
    })?;

    Ok(CertificateInfo {
        common_name,
        issuer,
        not_after,
    })
}

fn first_common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|cn| cn.to_string())
}

use chrono::{DateTime, Duration, Utc};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa};
use time::OffsetDateTime;

pub struct GeneratedCert {
    pub der: Vec<u8>,
    pub key_der: Vec<u8>,
}

pub fn future_date(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

fn to_offset(instant: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(instant.timestamp()).unwrap()
}

fn params_for(common_name: Option<&str>, not_after: OffsetDateTime) -> CertificateParams {
    let mut params = CertificateParams::new(vec!["localhost".to_string()]);
    params.distinguished_name = {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "cert_watch tests");
        if let Some(cn) = common_name {
            dn.push(DnType::CommonName, cn);
        }
        dn
    };
    params.not_before = rcgen::date_time_ymd(2015, 1, 1);
    params.not_after = not_after;
    params
}

pub fn self_signed(common_name: &str, not_after: DateTime<Utc>) -> GeneratedCert {
    self_signed_at(common_name, to_offset(not_after))
}

pub fn self_signed_at(common_name: &str, not_after: OffsetDateTime) -> GeneratedCert {
    let cert = Certificate::from_params(params_for(Some(common_name), not_after)).unwrap();
    GeneratedCert {
        der: cert.serialize_der().unwrap(),
        key_der: cert.serialize_private_key_der(),
    }
}

/// Leaf signed by a throwaway CA, so subject and issuer names differ.
pub fn issued_by(common_name: &str, issuer_name: &str, not_after: DateTime<Utc>) -> Vec<u8> {
    let mut ca_params = params_for(Some(issuer_name), rcgen::date_time_ymd(2060, 1, 1));
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca = Certificate::from_params(ca_params).unwrap();

    let leaf = Certificate::from_params(params_for(Some(common_name), to_offset(not_after))).unwrap();
    leaf.serialize_der_with_signer(&ca).unwrap()
}

pub fn without_common_name(not_after: DateTime<Utc>) -> Vec<u8> {
    let cert = Certificate::from_params(params_for(None, to_offset(not_after))).unwrap();
    cert.serialize_der().unwrap()
}

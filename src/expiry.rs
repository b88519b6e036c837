use chrono::{DateTime, Duration, Utc};

use crate::cert_parser::CertificateInfo;
use crate::target::Target;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub days_remaining_threshold: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationResult {
    pub target: Target,
    pub certificate: CertificateInfo,
    pub days_remaining: i64,
    pub exceeds_threshold: bool,
}

/// Whole days from `now` until `not_after`, rounded towards negative infinity.
/// A certificate that expired an hour ago has -1 days remaining, not 0.
pub fn days_remaining(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = not_after - now;
    let days = delta.num_days();
    if delta < Duration::days(days) {
        days - 1
    } else {
        days
    }
}

pub fn evaluate(
    target: Target,
    certificate: CertificateInfo,
    now: DateTime<Utc>,
    threshold: ThresholdConfig,
) -> EvaluationResult {
    let days_remaining = days_remaining(certificate.not_after, now);
    EvaluationResult {
        exceeds_threshold: days_remaining <= i64::from(threshold.days_remaining_threshold),
        days_remaining,
        target,
        certificate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 8, 30, 0).unwrap()
    }

    fn info(not_after: DateTime<Utc>) -> CertificateInfo {
        CertificateInfo {
            common_name: "www.example.com".to_string(),
            issuer: "Example CA".to_string(),
            not_after,
        }
    }

    fn threshold(days: u32) -> ThresholdConfig {
        ThresholdConfig {
            days_remaining_threshold: days,
        }
    }

    fn target() -> Target {
        Target::new("www.example.com", 443, std::time::Duration::from_secs(10))
    }

    #[test]
    fn inclusive_threshold_boundary() {
        let cert = info(now() + Duration::days(30));

        let at = evaluate(target(), cert.clone(), now(), threshold(30));
        assert_eq!(at.days_remaining, 30);
        assert!(at.exceeds_threshold);

        let below = evaluate(target(), cert, now(), threshold(29));
        assert!(!below.exceeds_threshold);
    }

    #[test]
    fn expired_certificates_always_alert() {
        for ago in [Duration::seconds(1), Duration::hours(5), Duration::days(1), Duration::days(400)] {
            let result = evaluate(target(), info(now() - ago), now(), threshold(0));
            assert!(result.days_remaining < 0, "{:?} ago gave {}", ago, result.days_remaining);
            assert!(result.exceeds_threshold);
        }
    }

    #[test]
    fn partial_days_floor() {
        assert_eq!(days_remaining(now() + Duration::hours(47), now()), 1);
        assert_eq!(days_remaining(now() + Duration::hours(23), now()), 0);
        assert_eq!(days_remaining(now(), now()), 0);
        assert_eq!(days_remaining(now() - Duration::hours(1), now()), -1);
        assert_eq!(days_remaining(now() - Duration::hours(25), now()), -2);
        assert_eq!(days_remaining(now() - Duration::days(3), now()), -3);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let cert = info(now() + Duration::days(12) + Duration::minutes(7));
        let first = evaluate(target(), cert.clone(), now(), threshold(14));
        let second = evaluate(target(), cert, now(), threshold(14));
        assert_eq!(first, second);
        assert_eq!(first.days_remaining, 12);
    }
}

use async_trait::async_trait;
use log::{error, info, warn};

use crate::error::MonitorError;
use crate::expiry::EvaluationResult;

const EXPIRY_FORMAT: &str = "%d-%b-%Y (%H:%M:%S%.6f)";

/// Delivers one notification. Implementations must be safe to call from several
/// tasks at once.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Returns the transport's status code (HTTP status for the mail API).
    async fn send(&self, subject: &str, html_body: &str, recipient: &str) -> Result<u16, MonitorError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertBody {
    pub common_name: String,
    pub issuer: String,
    pub expiry_date: String,
}

impl AlertBody {
    pub fn to_html(&self) -> String {
        format!(
            "<strong>Certificate Common Name: </strong>{}<p><strong>Issuer: </strong>{}</p><p><strong>Expiry Date: </strong>{}</p>",
            escape_html(&self.common_name),
            escape_html(&self.issuer),
            self.expiry_date
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertPayload {
    pub recipient: String,
    pub subject: String,
    pub body: AlertBody,
}

impl AlertPayload {
    pub fn from_evaluation(result: &EvaluationResult, recipient: &str) -> Self {
        let cert = &result.certificate;
        AlertPayload {
            recipient: recipient.to_string(),
            subject: format!("TLS / SSL cert expires soon ({})", cert.common_name),
            body: AlertBody {
                common_name: cert.common_name.clone(),
                issuer: cert.issuer.clone(),
                expiry_date: cert.not_after.format(EXPIRY_FORMAT).to_string(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    fn from_status(status: u16) -> Self {
        DispatchOutcome {
            success: (200..300).contains(&status),
            status_code: Some(status),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        DispatchOutcome {
            success: false,
            status_code: None,
            error: Some(error),
        }
    }
}

/// Sends exactly one alert for a result that crossed the threshold. Transport failures are
/// reported in the returned outcome and never propagated.
pub async fn dispatch(
    result: &EvaluationResult,
    recipient: &str,
    sender: &dyn NotificationSender,
) -> DispatchOutcome {
    let payload = AlertPayload::from_evaluation(result, recipient);
    match sender
        .send(&payload.subject, &payload.body.to_html(), &payload.recipient)
        .await
    {
        Ok(status) => {
            let outcome = DispatchOutcome::from_status(status);
            if outcome.success {
                info!("📧 Alert for {} sent to {} (status {})", result.target, recipient, status);
            } else {
                warn!("⚠️ Alert for {} rejected with status {}", result.target, status);
            }
            outcome
        }
        Err(e) => {
            error!("❌ Alert for {} could not be sent: {}", result.target, e);
            DispatchOutcome::failed(e.to_string())
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::cert_parser::CertificateInfo;
    use crate::target::Target;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SentMessage {
        pub subject: String,
        pub html_body: String,
        pub recipient: String,
    }

    /// Records every call and answers with a fixed status.
    pub struct RecordingSender {
        pub status: u16,
        pub sent: Mutex<Vec<SentMessage>>,
    }

    impl RecordingSender {
        pub fn new(status: u16) -> Self {
            RecordingSender {
                status,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSender for RecordingSender {
        async fn send(&self, subject: &str, html_body: &str, recipient: &str) -> Result<u16, MonitorError> {
            self.sent.lock().unwrap().push(SentMessage {
                subject: subject.to_string(),
                html_body: html_body.to_string(),
                recipient: recipient.to_string(),
            });
            Ok(self.status)
        }
    }

    pub struct FailingSender;

    #[async_trait]
    impl NotificationSender for FailingSender {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<u16, MonitorError> {
            Err(MonitorError::DispatchError("mail relay unreachable".to_string()))
        }
    }

    fn flagged() -> EvaluationResult {
        EvaluationResult {
            target: Target::new("shop.example.com", 443, Duration::from_secs(10)),
            certificate: CertificateInfo {
                common_name: "shop.example.com".to_string(),
                issuer: "R3".to_string(),
                not_after: Utc.with_ymd_and_hms(2026, 11, 2, 9, 5, 7).unwrap(),
            },
            days_remaining: 5,
            exceeds_threshold: true,
        }
    }

    #[test]
    fn payload_fields() {
        let payload = AlertPayload::from_evaluation(&flagged(), "ops@example.com");
        assert_eq!(payload.recipient, "ops@example.com");
        assert_eq!(payload.subject, "TLS / SSL cert expires soon (shop.example.com)");
        assert_eq!(payload.body.issuer, "R3");
        assert_eq!(payload.body.expiry_date, "02-Nov-2026 (09:05:07.000000)");

        let html = payload.body.to_html();
        assert!(html.contains("<strong>Certificate Common Name: </strong>shop.example.com"));
        assert!(html.contains("<p><strong>Issuer: </strong>R3</p>"));
        assert!(html.contains("02-Nov-2026 (09:05:07.000000)"));
    }

    #[test]
    fn html_escapes_certificate_names() {
        let body = AlertBody {
            common_name: "<script>".to_string(),
            issuer: "A & B".to_string(),
            expiry_date: String::new(),
        };
        let html = body.to_html();
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("A &amp; B"));
    }

    #[tokio::test]
    async fn sends_once_and_reports_status() {
        let sender = RecordingSender::new(202);
        let outcome = dispatch(&flagged(), "ops@example.com", &sender).await;

        assert_eq!(
            outcome,
            DispatchOutcome {
                success: true,
                status_code: Some(202),
                error: None
            }
        );
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "ops@example.com");
        assert_eq!(sent[0].subject, "TLS / SSL cert expires soon (shop.example.com)");
    }

    #[tokio::test]
    async fn rejected_status_is_not_success() {
        let sender = RecordingSender::new(401);
        let outcome = dispatch(&flagged(), "ops@example.com", &sender).await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(401));
    }

    #[tokio::test]
    async fn transport_failure_is_captured() {
        let outcome = dispatch(&flagged(), "ops@example.com", &FailingSender).await;
        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(outcome.error.unwrap().contains("mail relay unreachable"));
    }
}

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::alert::NotificationSender;
use crate::error::MonitorError;

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers alerts as HTML email through the SendGrid v3 mail-send API.
pub struct SendGridSender {
    client: Client,
    api_key: String,
    from_email: String,
    endpoint: String,
}

impl SendGridSender {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Self {
        SendGridSender {
            client: Client::new(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn mail_request(&self, subject: &str, html_body: &str, recipient: &str) -> Value {
        json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.from_email },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html_body }],
        })
    }
}

#[async_trait]
impl NotificationSender for SendGridSender {
    async fn send(&self, subject: &str, html_body: &str, recipient: &str) -> Result<u16, MonitorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.mail_request(subject, html_body, recipient))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MonitorError::DispatchError(e.to_string()))?;

        let status = response.status().as_u16();
        debug!("SendGrid answered {} for {}", status, recipient);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::net::TcpListener;

    #[test]
    fn request_shape() {
        let sender = SendGridSender::new("SG.key", "alerts@example.com");
        let body = sender.mail_request("subject line", "<p>hi</p>", "ops@example.com");

        assert_eq!(body["personalizations"][0]["to"][0]["email"], "ops@example.com");
        assert_eq!(body["from"]["email"], "alerts@example.com");
        assert_eq!(body["subject"], "subject line");
        assert_eq!(body["content"][0]["type"], "text/html");
        assert_eq!(body["content"][0]["value"], "<p>hi</p>");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_dispatch_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let sender = SendGridSender::new("SG.key", "alerts@example.com")
            .with_endpoint(format!("http://127.0.0.1:{}/v3/mail/send", port));

        let err = sender.send("s", "b", "ops@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DispatchError);
    }
}

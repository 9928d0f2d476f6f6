// src/services/notifier.rs

//! Notification delivery.
//!
//! One message is built per cycle and sent with a separate SMTP envelope per
//! recipient, so a bounced address does not stop delivery to the others.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use lettre::address::{Address, Envelope};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::error::{AppError, Result};
use crate::models::{EmailConfig, EventRecord, SourceConfig};
use crate::services::NotificationMessage;

/// Per-recipient outcome of a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients that accepted the message
    pub delivered: Vec<String>,
    /// Recipients that did not, with the reason
    pub rejected: Vec<(String, String)>,
}

impl DeliveryReport {
    /// Whether every recipient accepted the message.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Whether nobody accepted the message.
    pub fn is_total_failure(&self) -> bool {
        self.delivered.is_empty()
    }
}

/// Something that can tell people about new events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce `events` to `recipients`.
    ///
    /// Individual recipient failures are collected in the report. An error
    /// means nothing could be attempted: no recipients, or the transport is
    /// unreachable.
    async fn notify(
        &self,
        events: &[EventRecord],
        recipients: &[String],
    ) -> Result<DeliveryReport>;
}

/// SMTP notifier using STARTTLS and login credentials.
pub struct EmailNotifier {
    email: EmailConfig,
    source: SourceConfig,
}

impl EmailNotifier {
    pub fn new(email: EmailConfig, source: SourceConfig) -> Self {
        Self { email, source }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let credentials = Credentials::new(
            self.email.sender_email.clone(),
            self.email.sender_password.clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.email.smtp_server)
            .map_err(|e| AppError::notify(format!("SMTP relay {}: {e}", self.email.smtp_server)))?
            .port(self.email.smtp_port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(self.email.timeout_secs)))
            .build();
        Ok(transport)
    }

    /// Build the message shown to every recipient.
    fn build_message(&self, events: &[EventRecord], recipients: &[Address]) -> Result<Message> {
        let rendered = NotificationMessage::render(
            events,
            &self.source,
            self.email.footer.as_deref(),
            Local::now().date_naive(),
        );

        let from: Mailbox = self
            .email
            .sender_email
            .parse()
            .map_err(|e| AppError::email(format!("sender {}: {e}", self.email.sender_email)))?;

        let mut builder = Message::builder().from(from).subject(rendered.subject);
        for address in recipients {
            builder = builder.to(Mailbox::new(None, address.clone()));
        }

        builder
            .multipart(MultiPart::alternative_plain_html(rendered.text, rendered.html))
            .map_err(AppError::email)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        events: &[EventRecord],
        recipients: &[String],
    ) -> Result<DeliveryReport> {
        if recipients.is_empty() {
            return Err(AppError::notify("no recipient emails configured"));
        }

        let (addresses, mut report) = parse_recipients(recipients);
        if addresses.is_empty() {
            log::error!("None of the {} configured recipients is a valid address", recipients.len());
            return Ok(report);
        }

        let sender: Address = self
            .email
            .sender_email
            .parse()
            .map_err(|e| AppError::email(format!("sender {}: {e}", self.email.sender_email)))?;
        let message = self.build_message(events, &addresses)?;
        let raw = message.formatted();

        let transport = self.transport()?;
        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AppError::notify(format!(
                    "SMTP server {}:{} refused the connection",
                    self.email.smtp_server, self.email.smtp_port
                )));
            }
            Err(e) => {
                return Err(AppError::notify(format!(
                    "SMTP server {}:{} unreachable: {e}",
                    self.email.smtp_server, self.email.smtp_port
                )));
            }
        }

        for address in addresses {
            let envelope = Envelope::new(Some(sender.clone()), vec![address.clone()])
                .map_err(AppError::email)?;
            match transport.send_raw(&envelope, &raw).await {
                Ok(_) => report.delivered.push(address.to_string()),
                Err(e) => {
                    log::warn!("Delivery to {} failed: {}", address, e);
                    report.rejected.push((address.to_string(), e.to_string()));
                }
            }
        }

        if report.delivered.is_empty() {
            log::error!("Notification was not delivered to any recipient");
        } else {
            log::info!(
                "Email notification sent to {} recipient(s): {}",
                report.delivered.len(),
                report.delivered.join(", ")
            );
        }
        Ok(report)
    }
}

/// Split recipients into valid addresses and a report pre-filled with the
/// ones that do not parse.
fn parse_recipients(recipients: &[String]) -> (Vec<Address>, DeliveryReport) {
    let mut report = DeliveryReport::default();
    let mut addresses = Vec::with_capacity(recipients.len());

    for recipient in recipients {
        match recipient.parse::<Address>() {
            Ok(address) => addresses.push(address),
            Err(e) => {
                log::warn!("Invalid recipient address {:?}: {}", recipient, e);
                report.rejected.push((recipient.clone(), e.to_string()));
            }
        }
    }

    (addresses, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> EmailNotifier {
        let mut email = EmailConfig::default();
        email.sender_email = "tracker@example.com".to_string();
        EmailNotifier::new(email, SourceConfig::default())
    }

    fn events() -> Vec<EventRecord> {
        vec![EventRecord::new("Satsang", "2024-01-01", None, None)]
    }

    #[test]
    fn test_parse_recipients() {
        let recipients = vec![
            "a@example.com".to_string(),
            "not an address".to_string(),
            "b@example.com".to_string(),
        ];
        let (addresses, report) = parse_recipients(&recipients);
        assert_eq!(addresses.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "not an address");
    }

    #[test]
    fn test_build_message_headers() {
        let addresses: Vec<Address> = vec![
            "a@example.com".parse().unwrap(),
            "b@example.com".parse().unwrap(),
        ];
        let message = notifier().build_message(&events(), &addresses).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();

        assert!(formatted.contains("From: tracker@example.com"));
        assert!(formatted.contains("a@example.com"));
        assert!(formatted.contains("b@example.com"));
        assert!(formatted.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn test_no_recipients_is_error() {
        let err = notifier().notify(&events(), &[]).await.unwrap_err();
        assert!(matches!(err, AppError::Notify(_)));
    }

    #[tokio::test]
    async fn test_all_invalid_recipients_reported_without_sending() {
        let report = notifier()
            .notify(&events(), &["nope".to_string()])
            .await
            .unwrap();
        assert!(report.is_total_failure());
        assert!(!report.is_complete());
    }

    #[test]
    fn test_delivery_report_flags() {
        let report = DeliveryReport {
            delivered: vec!["a@example.com".into()],
            rejected: Vec::new(),
        };
        assert!(report.is_complete());
        assert!(!report.is_total_failure());
    }
}

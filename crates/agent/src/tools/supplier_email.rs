use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};

use stockpilot_core::config::SmtpConfig;

use super::{decode_json_input, Tool, ToolError};

pub const NAME: &str = "supplier_email";
const LOGGED_BODY_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl EmailMessage {
    pub fn from_value(input: Value) -> Result<Self, ToolError> {
        let message: Self = serde_json::from_value(decode_json_input(NAME, input)?)
            .map_err(|error| ToolError::invalid(NAME, error.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    pub fn validate(&self) -> Result<(), ToolError> {
        if self.to_email.trim().is_empty() {
            return Err(ToolError::invalid(NAME, "`to_email` is empty"));
        }
        if self.subject.trim().is_empty() {
            return Err(ToolError::invalid(NAME, "`subject` is empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailOutcome {
    MockSent,
    Sent { to: String },
    Failed { message: String },
}

impl EmailOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::MockSent => json!({ "status": "mock_sent", "message": "Email logged (mock mode)" }),
            Self::Sent { to } => json!({ "status": "sent", "to": to }),
            Self::Failed { message } => json!({ "status": "error", "message": message }),
        }
    }
}

/// Supplier notifications. Mock mode only logs; live mode opens one SMTP
/// session per message.
#[derive(Clone, Debug)]
pub struct SupplierEmailTool {
    smtp: SmtpConfig,
}

impl SupplierEmailTool {
    pub fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }

    pub fn is_mock(&self) -> bool {
        self.smtp.mock_mode
    }

    pub async fn send(&self, message: &EmailMessage) -> EmailOutcome {
        if self.smtp.mock_mode {
            let preview: String = message.body.chars().take(LOGGED_BODY_CHARS).collect();
            tracing::info!(
                event_name = "tool.supplier_email.mock_sent",
                to = %message.to_email,
                subject = %message.subject,
                body = %preview,
                "mock email logged"
            );
            return EmailOutcome::MockSent;
        }

        match self.deliver(message).await {
            Ok(()) => {
                tracing::info!(
                    event_name = "tool.supplier_email.sent",
                    to = %message.to_email,
                    host = %self.smtp.host,
                    "email sent"
                );
                EmailOutcome::Sent { to: message.to_email.clone() }
            }
            Err(reason) => {
                tracing::warn!(
                    event_name = "tool.supplier_email.failed",
                    to = %message.to_email,
                    host = %self.smtp.host,
                    error = %reason,
                    "email delivery failed"
                );
                EmailOutcome::Failed { message: reason }
            }
        }
    }

    async fn deliver(&self, message: &EmailMessage) -> Result<(), String> {
        let from: Mailbox = self
            .smtp
            .sender_address()
            .parse()
            .map_err(|error| format!("invalid sender address: {error}"))?;
        let to: Mailbox =
            message.to_email.trim().parse().map_err(|error| format!("invalid recipient: {error}"))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        if let Some(reply_to) = message.reply_to.as_deref().filter(|value| !value.trim().is_empty())
        {
            let reply_to: Mailbox =
                reply_to.trim().parse().map_err(|error| format!("invalid reply-to: {error}"))?;
            builder = builder.reply_to(reply_to);
        }
        let email =
            builder.body(message.body.clone()).map_err(|error| format!("message build failed: {error}"))?;

        let transport = if self.smtp.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)
                .map_err(|error| format!("SMTP setup failed: {error}"))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.smtp.host)
        };
        let mut transport = transport
            .port(self.smtp.port)
            .timeout(Some(Duration::from_secs(self.smtp.timeout_secs.max(1))));

        let password = self.smtp.password.expose_secret();
        if !self.smtp.username.is_empty() && !password.is_empty() {
            transport =
                transport.credentials(Credentials::new(self.smtp.username.clone(), password.to_string()));
        }

        transport
            .build()
            .send(email)
            .await
            .map(|_| ())
            .map_err(|error| format!("SMTP error: {error}"))
    }
}

#[async_trait]
impl Tool for SupplierEmailTool {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Send an email to a supplier. Input: {\"to_email\", \"subject\", \"body\", \"reply_to\"?}."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let message = EmailMessage::from_value(input)?;
        Ok(self.send(&message).await.into_value())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stockpilot_core::config::AppConfig;

    use super::{EmailMessage, EmailOutcome, SupplierEmailTool};
    use crate::tools::{Tool, ToolError};

    fn message() -> EmailMessage {
        EmailMessage {
            to_email: "supplier@example.com".to_string(),
            subject: "Reorder request: Widget A".to_string(),
            body: "x".repeat(500),
            reply_to: None,
        }
    }

    #[test]
    fn recipient_and_subject_are_required() {
        let missing_subject = EmailMessage::from_value(json!({"to_email": "a@b.c", "subject": " "}));
        let missing_recipient = EmailMessage::from_value(json!({"subject": "hi"}));

        assert!(matches!(missing_subject, Err(ToolError::InvalidInput { .. })));
        assert!(matches!(missing_recipient, Err(ToolError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn mock_mode_logs_and_reports_mock_sent() {
        let tool = SupplierEmailTool::new(AppConfig::default().smtp);

        let outcome = tool.send(&message()).await;

        assert!(tool.is_mock());
        assert_eq!(outcome, EmailOutcome::MockSent);
        assert_eq!(
            outcome.into_value(),
            json!({"status": "mock_sent", "message": "Email logged (mock mode)"})
        );
    }

    #[tokio::test]
    async fn unreachable_host_returns_error_status() {
        let mut smtp = AppConfig::default().smtp;
        smtp.mock_mode = false;
        smtp.use_tls = false;
        smtp.host = "127.0.0.1".to_string();
        smtp.port = 1;
        smtp.timeout_secs = 2;
        let tool = SupplierEmailTool::new(smtp);

        let result = tool
            .execute(json!({
                "to_email": "supplier@example.com",
                "subject": "Reorder request",
                "body": "Please restock."
            }))
            .await
            .expect("valid input never raises");

        assert_eq!(result["status"], json!("error"));
        assert!(result["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn invalid_recipient_is_an_error_status_in_live_mode() {
        let mut smtp = AppConfig::default().smtp;
        smtp.mock_mode = false;
        let tool = SupplierEmailTool::new(smtp);

        let outcome = tool
            .send(&EmailMessage { to_email: "not an address".to_string(), ..message() })
            .await;

        assert!(!outcome.is_delivered());
    }
}

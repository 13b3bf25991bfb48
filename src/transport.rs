//! Outbound mail delivery seam.
//!
//! The engine never talks SMTP directly: reply composition hands a fully
//! formed [`OutgoingMessage`] to a [`MailTransport`], and the production
//! implementation drives lettre's async SMTP transport with the sending
//! account's credentials. Tests substitute a mock.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use uuid::Uuid;

use crate::models::EmailAccount;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("account is not configured for sending: {0}")]
    Misconfigured(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("smtp delivery failed: {0}")]
    Smtp(String),
}

/// A message ready for delivery. Threading headers are already derived; the
/// message id is minted up front so the stored record and the wire message
/// agree on identity.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub content: String,
    pub html_content: Option<String>,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

/// Delivery collaborator. Returns the provider-assigned message identity on
/// success.
#[rocket::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        account: &EmailAccount,
        message: &OutgoingMessage,
    ) -> Result<String, TransportError>;
}

/// RFC 5322 message id rooted at the sending address's domain, used when the
/// provider does not mint one itself.
pub fn generate_message_id(sender: &str) -> String {
    let domain = sender.rsplit('@').next().unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

/// SMTP delivery via lettre, one STARTTLS connection per send.
pub struct SmtpMailer;

impl SmtpMailer {
    fn build_message(message: &OutgoingMessage) -> Result<Message, TransportError> {
        let from: Mailbox = message
            .from
            .parse()
            .map_err(|_| TransportError::InvalidMessage(format!("bad from address '{}'", message.from)))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| TransportError::InvalidMessage(format!("bad to address '{}'", message.to)))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .message_id(Some(message.message_id.clone()));

        if let Some(in_reply_to) = &message.in_reply_to {
            builder = builder.in_reply_to(in_reply_to.clone());
        }
        if let Some(references) = &message.references {
            builder = builder.references(references.clone());
        }

        let built = match &message.html_content {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.content.clone(),
                html.clone(),
            )),
            None => builder.body(message.content.clone()),
        };

        built.map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }
}

#[rocket::async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        account: &EmailAccount,
        message: &OutgoingMessage,
    ) -> Result<String, TransportError> {
        let host = account
            .smtp_host
            .as_deref()
            .ok_or_else(|| TransportError::Misconfigured(account.email.clone()))?;
        let password = account
            .smtp_password
            .as_deref()
            .ok_or_else(|| TransportError::Misconfigured(account.email.clone()))?;
        let username = account
            .smtp_username
            .clone()
            .unwrap_or_else(|| account.email.clone());
        let port = account.smtp_port.unwrap_or(587) as u16;

        let email = Self::build_message(message)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| TransportError::Smtp(e.to_string()))?
            .port(port)
            .credentials(Credentials::new(username, password.to_string()))
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        // SMTP does not echo an identity back; the minted one is authoritative.
        Ok(message.message_id.clone())
    }
}

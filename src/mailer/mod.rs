//! Outbound mail contract.
//!
//! Actual SMTP delivery is an external collaborator; the core only needs a
//! way to hand off a templated message. Dispatch happens on a tracked
//! background task so a slow or panicking mail run never touches the
//! request path.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

/// Sends a templated message to one recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: &str, payload: Value) -> Result<(), MailerError>;
}

/// Reference implementation that logs instead of delivering. Used by the
/// demo binary and tests.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &str, _payload: Value) -> Result<(), MailerError> {
        tracing::info!(recipient = %recipient, template = %template, "mail dispatched");
        Ok(())
    }
}

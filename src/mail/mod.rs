mod guard;
mod notifier;
mod smtp;

pub use guard::{GuardedMailer, MailerGuard, DEFAULT_COOLDOWN};
pub use notifier::{Notifier, Recipient};
pub use smtp::SmtpMailer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, Error)]
pub enum MailError {
    #[error("mailer suspended until {until}")]
    Suspended { until: DateTime<Utc> },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("provider rate limited ({code}): {message}")]
    RateLimited { code: u16, message: String },

    #[error("smtp timeout: {0}")]
    Timeout(String),

    #[error("smtp rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("smtp transport: {0}")]
    Transport(String),
}

impl MailError {
    /// Worth another attempt after a short pause.
    pub fn is_transient(&self) -> bool {
        match self {
            MailError::Timeout(_) | MailError::Transport(_) => true,
            MailError::Rejected { code, .. } => (400..500).contains(code),
            _ => false,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Outcome of one recipient in a fan-out.
#[derive(Debug)]
pub struct Delivery {
    pub to: String,
    pub result: Result<(), MailError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: usize,
}

impl FanOutReport {
    pub fn from_deliveries(deliveries: &[Delivery]) -> Self {
        let delivered = deliveries.iter().filter(|d| d.result.is_ok()).count();
        Self {
            delivered,
            failed: deliveries.len() - delivered,
        }
    }
}

/// Sends every mail concurrently and waits for all of them. A failure for one
/// recipient never cancels or hides the others.
pub async fn send_all(mailer: &GuardedMailer, mails: Vec<OutgoingMail>) -> Vec<Delivery> {
    join_all(mails.into_iter().map(|mail| async move {
        let result = mailer.send(&mail).await;
        Delivery {
            to: mail.to,
            result,
        }
    }))
    .await
}

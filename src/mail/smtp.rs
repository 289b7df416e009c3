use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use super::guard::is_quota_exhausted;
use super::{MailError, Mailer, OutgoingMail};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_millis(config.timeout_ms)))
            .pool_config(PoolConfig::new().max_size(config.max_connections));

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| format!("EMAIL_FROM {:?} is not a valid address: {}", config.from, e))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn classify(err: lettre::transport::smtp::Error) -> MailError {
    let message = err.to_string();
    if let Some(code) = err.status() {
        let code: u16 = code.to_string().parse().unwrap_or(0);
        if is_quota_exhausted(code, &message) {
            return MailError::RateLimited { code, message };
        }
        return MailError::Rejected { code, message };
    }
    if err.is_timeout() {
        return MailError::Timeout(message);
    }
    MailError::Transport(message)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::InvalidMessage(format!("recipient {:?}: {}", mail.to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(mail.html.clone())
            .map_err(|e| MailError::InvalidMessage(e.to_string()))?;

        self.transport.send(message).await.map_err(classify)?;
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{MailError, Mailer, OutgoingMail};
use crate::clock::Clock;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(25 * 60 * 60);

/// Daily-quota signature of the mail provider: a 550 whose text names the quota.
pub fn is_quota_exhausted(code: u16, message: &str) -> bool {
    let message = message.to_lowercase();
    code == 550
        && (message.contains("5.4.5")
            || message.contains("daily user sending")
            || message.contains("quota exceeded"))
}

/// Process-wide circuit breaker for outbound mail.
///
/// Holds a single "blocked until" instant. Once tripped every guarded send
/// fails fast until the instant passes.
pub struct MailerGuard {
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    blocked_until_ms: AtomicI64,
}

impl MailerGuard {
    pub fn new(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            clock,
            cooldown,
            blocked_until_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_until().is_some()
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        let until = self.blocked_until_ms.load(Ordering::SeqCst);
        if self.clock.now().timestamp_millis() < until {
            DateTime::from_timestamp_millis(until)
        } else {
            None
        }
    }

    /// Earliest instant a send will be attempted again.
    pub fn next_available(&self) -> DateTime<Utc> {
        self.blocked_until().unwrap_or_else(|| self.clock.now())
    }

    pub fn trip(&self) -> DateTime<Utc> {
        self.trip_for(self.cooldown)
    }

    pub fn trip_for(&self, duration: Duration) -> DateTime<Utc> {
        // Cooldowns past the representable range saturate instead of overflowing.
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| self.clock.now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.blocked_until_ms
            .store(until.timestamp_millis(), Ordering::SeqCst);
        warn!(until = %until.to_rfc3339(), "Mailer cooling down");
        until
    }
}

fn trips_cooldown(err: &MailError) -> bool {
    match err {
        MailError::RateLimited { .. } => true,
        MailError::Rejected { code, message } => is_quota_exhausted(*code, message),
        _ => false,
    }
}

/// Every outbound mail goes through here: checks the guard, retries
/// transient failures, and trips the guard on a quota signature.
pub struct GuardedMailer {
    inner: Arc<dyn Mailer>,
    guard: Arc<MailerGuard>,
    attempts: usize,
    backoff: Duration,
}

impl GuardedMailer {
    pub fn new(
        inner: Arc<dyn Mailer>,
        guard: Arc<MailerGuard>,
        attempts: usize,
        backoff: Duration,
    ) -> Self {
        Self {
            inner,
            guard,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn guard(&self) -> &MailerGuard {
        &self.guard
    }

    pub async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let mut attempt = 1;
        loop {
            if let Some(until) = self.guard.blocked_until() {
                return Err(MailError::Suspended { until });
            }

            let err = match self.inner.send(mail).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if trips_cooldown(&err) {
                self.guard.trip();
                return Err(err);
            }
            if !err.is_transient() || attempt >= self.attempts {
                return Err(err);
            }

            warn!(to = %mail.to, attempt, error = %err, "Transient mail failure, retrying");
            tokio::time::sleep(self.backoff * attempt as u32).await;
            attempt += 1;
        }
    }
}

use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use super::paper_id::{format_paper_id, next_serial, MAX_ALLOCATION_ATTEMPTS};
use crate::clock::Clock;
use crate::db::{NewSubmission, Store, StoreError, Submission};
use crate::error::AppError;
use crate::mail::{FanOutReport, Notifier};

const MIN_ABSTRACT_WORDS: usize = 50;
const MAX_ABSTRACT_WORDS: usize = 500;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[\d\s-]{8,}$").expect("valid regex"))
}

fn orcid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").expect("valid regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_re().is_match(email.trim())
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

pub fn validate(new: &NewSubmission) -> Result<(), AppError> {
    let required = [
        ("name", &new.name),
        ("email", &new.email),
        ("phone", &new.phone),
        ("institution", &new.institution),
        ("country", &new.country),
        ("paperTitle", &new.paper_title),
        ("paperAbstract", &new.paper_abstract),
        ("keywords", &new.keywords),
        ("primarySubject", &new.primary_subject),
    ];
    let mut missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();
    if !new.agree_terms {
        missing.push("agreeTerms");
    }
    if !new.agree_review {
        missing.push("agreeReview");
    }
    if !missing.is_empty() {
        return Err(invalid(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    if !is_valid_email(&new.email) {
        return Err(invalid("Invalid email format"));
    }
    if !phone_re().is_match(new.phone.trim()) {
        return Err(invalid("Invalid phone number format"));
    }
    if let Some(orcid) = new.orcid_id.as_deref().filter(|o| !o.is_empty()) {
        if !orcid_re().is_match(orcid) {
            return Err(invalid(
                "Invalid ORCID format (should be 0000-0000-0000-0000)",
            ));
        }
    }

    let words = new.paper_abstract.split_whitespace().count();
    if words < MIN_ABSTRACT_WORDS {
        return Err(invalid(format!(
            "Abstract must be at least {MIN_ABSTRACT_WORDS} words long"
        )));
    }
    if words > MAX_ABSTRACT_WORDS {
        return Err(invalid(format!(
            "Abstract must not exceed {MAX_ABSTRACT_WORDS} words"
        )));
    }

    for (i, author) in new.co_authors.iter().enumerate() {
        let n = i + 1;
        if [&author.name, &author.email, &author.institution, &author.country]
            .iter()
            .any(|v| v.trim().is_empty())
        {
            return Err(invalid(format!("Co-author {n} is missing required fields")));
        }
        if !is_valid_email(&author.email) {
            return Err(invalid(format!("Invalid email format for co-author {n}")));
        }
        if let Some(orcid) = author.orcid_id.as_deref().filter(|o| !o.is_empty()) {
            if !orcid_re().is_match(orcid) {
                return Err(invalid(format!("Invalid ORCID format for co-author {n}")));
            }
        }
    }

    Ok(())
}

/// Persists a new submission under a freshly allocated paper id.
///
/// The serial comes from a non-atomic max scan, so a concurrent intake may
/// claim the same id first. The store's unique constraint rejects the loser,
/// which moves to the next serial, up to `MAX_ALLOCATION_ATTEMPTS` tries.
pub async fn create_with_paper_id(
    store: &dyn Store,
    clock: &dyn Clock,
    new: &NewSubmission,
) -> Result<Submission, AppError> {
    let mut serial = next_serial(store).await?;

    for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
        let now = clock.now();
        let paper_id = format_paper_id(now, serial);

        match store.create_submission(new, &paper_id, now).await {
            Ok(submission) => return Ok(submission),
            Err(StoreError::DuplicatePaperId) => {
                warn!(paper_id = %paper_id, attempt, "Paper id taken, trying next serial");
                serial = serial.saturating_add(1);
            }
            Err(StoreError::DuplicateEmail) => {
                return Err(AppError::Conflict(
                    "A submission with this email address already exists".to_string(),
                ))
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::PaperIdContention {
        attempts: MAX_ALLOCATION_ATTEMPTS,
    })
}

/// Validates, persists and acknowledges a paper submission. Confirmation mail
/// is best effort and never fails the intake.
pub async fn submit_paper(
    store: &dyn Store,
    notifier: &Notifier,
    clock: &dyn Clock,
    new: NewSubmission,
) -> Result<Submission, AppError> {
    validate(&new)?;

    if store.find_submission_by_email(&new.email).await?.is_some() {
        return Err(AppError::Conflict(
            "Speaker already registered with this email".to_string(),
        ));
    }

    let submission = create_with_paper_id(store, clock, &new).await?;
    info!(
        paper_id = %submission.label(),
        submission_id = %submission.id,
        "Paper submission stored"
    );

    let deliveries = notifier.submission_received(&submission).await;
    let report = FanOutReport::from_deliveries(&deliveries);
    info!(
        paper_id = %submission.label(),
        delivered = report.delivered,
        failed = report.failed,
        "Submission confirmation mail sent"
    );

    Ok(submission)
}

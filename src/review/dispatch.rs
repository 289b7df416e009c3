use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::status::ReviewStatus;
use crate::clock::Clock;
use crate::db::{CommitteeMemberSnapshot, Store, Submission, SubmissionPatch};
use crate::error::AppError;
use crate::mail::{FanOutReport, Notifier, Recipient};

#[derive(Debug, Clone, PartialEq)]
pub enum Recipients {
    AllActive,
    Selected(Vec<Uuid>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub submission: Submission,
    pub sent_to_members: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Sends a submission to the reviewing committee.
///
/// Mail goes out to every resolved member concurrently; delivery failures are
/// logged and counted but the submission is still marked as sent, with a
/// snapshot of everyone we attempted to notify.
pub async fn send_to_committee(
    store: &dyn Store,
    notifier: &Notifier,
    clock: &dyn Clock,
    submission_id: Uuid,
    recipients: Recipients,
) -> Result<DispatchOutcome, AppError> {
    let submission = store
        .get_submission(submission_id)
        .await?
        .ok_or(AppError::NotFound("Speaker"))?;

    let members = match &recipients {
        Recipients::AllActive => store.find_active_committee_members(None).await?,
        Recipients::Selected(ids) if ids.is_empty() => Vec::new(),
        Recipients::Selected(ids) => {
            store
                .find_active_committee_members(Some(ids.as_slice()))
                .await?
        }
    };
    if members.is_empty() {
        return Err(AppError::NoActiveRecipients);
    }

    let targets: Vec<Recipient> = members.iter().map(Recipient::from).collect();
    let deliveries = notifier.review_requests(&submission, &targets).await;
    let report = FanOutReport::from_deliveries(&deliveries);

    let now = clock.now();
    let snapshot = members
        .iter()
        .map(|m| CommitteeMemberSnapshot {
            id: m.id,
            name: m.name.clone(),
            email: m.email.clone(),
            sent_at: now,
        })
        .collect();

    let updated = store
        .update_submission(
            submission_id,
            SubmissionPatch {
                review_status: Some(ReviewStatus::SentToCommittee),
                sent_to_committee: Some(true),
                committee_members: Some(Some(snapshot)),
                ..Default::default()
            },
            now,
        )
        .await?;

    info!(
        paper_id = %updated.label(),
        members = members.len(),
        delivered = report.delivered,
        failed = report.failed,
        "Submission sent to committee"
    );

    Ok(DispatchOutcome {
        submission: updated,
        sent_to_members: members.len(),
        delivered: report.delivered,
        failed: report.failed,
    })
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{ExpressionStatusChange, Store, Submission, SubmissionPatch};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    SentToCommittee,
    UnderReview,
    Approved,
    Rejected,
    NeedsRevision,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 6] = [
        ReviewStatus::Pending,
        ReviewStatus::SentToCommittee,
        ReviewStatus::UnderReview,
        ReviewStatus::Approved,
        ReviewStatus::Rejected,
        ReviewStatus::NeedsRevision,
    ];

    /// Statuses the reminder scheduler keeps nagging about.
    pub const AWAITING_DECISION: [ReviewStatus; 3] = [
        ReviewStatus::Pending,
        ReviewStatus::SentToCommittee,
        ReviewStatus::UnderReview,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::SentToCommittee => "SENT_TO_COMMITTEE",
            ReviewStatus::UnderReview => "UNDER_REVIEW",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
            ReviewStatus::NeedsRevision => "NEEDS_REVISION",
        }
    }

    /// A decision has been reached. Admins may still reset to `Pending`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReviewStatus::Approved | ReviewStatus::Rejected | ReviewStatus::NeedsRevision
        )
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReviewStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::Validation("Invalid review status".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpressionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ExpressionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionStatus::Pending => "PENDING",
            ExpressionStatus::Accepted => "ACCEPTED",
            ExpressionStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpressionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExpressionStatus::Pending),
            "ACCEPTED" => Ok(ExpressionStatus::Accepted),
            "REJECTED" => Ok(ExpressionStatus::Rejected),
            _ => Err(AppError::Validation("Invalid status".to_string())),
        }
    }
}

/// The patch an admin status write produces. Any status may follow any other;
/// resetting to `Pending` restarts the review cycle: who was notified and how
/// often they were reminded are both forgotten.
pub fn status_patch(status: ReviewStatus) -> SubmissionPatch {
    let mut patch = SubmissionPatch {
        review_status: Some(status),
        ..Default::default()
    };
    if status == ReviewStatus::Pending {
        patch.sent_to_committee = Some(false);
        patch.committee_members = Some(None);
        patch.review_reminder_count = Some(0);
        patch.review_reminder_last_sent_at = Some(None);
    }
    patch
}

pub async fn update_review_status(
    store: &dyn Store,
    clock: &dyn Clock,
    submission_id: Uuid,
    raw_status: &str,
) -> Result<Submission, AppError> {
    let status: ReviewStatus = raw_status.parse()?;

    let updated = store
        .update_submission(submission_id, status_patch(status), clock.now())
        .await?;

    info!(
        submission_id = %submission_id,
        paper_id = updated.paper_id.as_deref().unwrap_or("-"),
        status = %status,
        "Review status updated"
    );
    Ok(updated)
}

pub async fn update_expression_status(
    store: &dyn Store,
    clock: &dyn Clock,
    expression_id: Uuid,
    raw_status: &str,
    acting_admin: Option<Uuid>,
) -> Result<ExpressionStatusChange, AppError> {
    let status: ExpressionStatus = raw_status.parse()?;

    let change = store
        .apply_expression_status(expression_id, status, acting_admin, clock.now())
        .await?;

    info!(
        expression_id = %expression_id,
        status = %status,
        synced = change.committee_member.is_some(),
        "Reviewer expression status updated"
    );
    Ok(change)
}

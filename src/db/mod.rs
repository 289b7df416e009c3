#[cfg(test)]
mod memory;
mod models;
mod postgres;

#[cfg(test)]
pub use memory::InMemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::review::status::ExpressionStatus;

pub type DbPool = Arc<PgPool>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("paper id already in use")]
    DuplicatePaperId,

    #[error("a record with this email already exists")]
    DuplicateEmail,

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("database unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Some(db.constraint().unwrap_or_default().to_string())
            }
            _ => None,
        };
        if let Some(constraint) = unique_violation {
            if constraint.contains("paper_id") {
                return StoreError::DuplicatePaperId;
            }
            if constraint.contains("email") {
                return StoreError::DuplicateEmail;
            }
        }

        if matches!(err, sqlx::Error::RowNotFound) {
            StoreError::NotFound
        } else if matches!(
            err,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)
        ) {
            StoreError::Corrupt(err.to_string())
        } else {
            StoreError::Unavailable(err)
        }
    }
}

/// Persistence operations the review core depends on.
///
/// Writes that must be atomic with each other are single trait methods so
/// every backend owns its own transaction boundary.
#[async_trait]
pub trait Store: Send + Sync {
    /// Largest numeric serial (characters from position 5 on) among all paper ids.
    async fn find_max_paper_serial(&self) -> Result<Option<u32>, StoreError>;

    async fn count_submissions_with_paper_id(&self) -> Result<u64, StoreError>;

    /// Fails with `DuplicatePaperId` or `DuplicateEmail` on uniqueness violations.
    async fn create_submission(
        &self,
        new: &NewSubmission,
        paper_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError>;

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError>;

    async fn find_submission_by_email(&self, email: &str)
        -> Result<Option<Submission>, StoreError>;

    async fn find_submissions(&self, filter: &SubmissionFilter)
        -> Result<Vec<Submission>, StoreError>;

    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<u64, StoreError>;

    async fn update_submission(
        &self,
        id: Uuid,
        patch: SubmissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError>;

    /// Increments the reminder counter and stamps `now`, but only while the
    /// submission is still awaiting a decision and below `max_reminders`.
    /// Returns `None` when the guard did not hold.
    async fn record_reminder_sent(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_reminders: i32,
    ) -> Result<Option<Submission>, StoreError>;

    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Active members only; `ids = None` selects the whole active directory.
    async fn find_active_committee_members(
        &self,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<CommitteeMember>, StoreError>;

    async fn list_committee_members(&self) -> Result<Vec<CommitteeMember>, StoreError>;

    async fn create_committee_member(
        &self,
        input: &CommitteeMemberInput,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError>;

    async fn update_committee_member(
        &self,
        id: Uuid,
        input: &CommitteeMemberInput,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError>;

    async fn delete_committee_member(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn create_reviewer_expression(
        &self,
        new: &NewReviewerExpression,
        now: DateTime<Utc>,
    ) -> Result<ReviewerExpression, StoreError>;

    async fn get_reviewer_expression(
        &self,
        id: Uuid,
    ) -> Result<Option<ReviewerExpression>, StoreError>;

    async fn list_reviewer_expressions(&self) -> Result<Vec<ReviewerExpression>, StoreError>;

    async fn delete_reviewer_expression(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Sets the expression status and, on `Accepted`, upserts the committee
    /// directory entry keyed by email. Both writes commit or neither does.
    async fn apply_expression_status(
        &self,
        id: Uuid,
        status: ExpressionStatus,
        acting_admin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ExpressionStatusChange, StoreError>;
}

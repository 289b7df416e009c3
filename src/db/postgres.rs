use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    CommitteeMember, CommitteeMemberInput, DbPool, ExpressionStatusChange, NewReviewerExpression,
    NewSubmission, ReviewerExpression, ReviewerExpressionRow, Store, StoreError, Submission,
    SubmissionFilter, SubmissionPatch, SubmissionRow,
};
use crate::review::status::{ExpressionStatus, ReviewStatus};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn awaiting_decision() -> Vec<String> {
    ReviewStatus::AWAITING_DECISION
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &SubmissionFilter) {
    qb.push(" WHERE TRUE");
    if let Some(statuses) = &filter.statuses {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        qb.push(" AND review_status = ANY(")
            .push_bind(statuses)
            .push(")");
    }
    if let Some(sent) = filter.sent_to_committee {
        qb.push(" AND sent_to_committee = ").push_bind(sent);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR paper_title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR institution ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_max_paper_serial(&self) -> Result<Option<u32>, StoreError> {
        let max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(SUBSTRING(paper_id FROM 5)::BIGINT)
            FROM submissions
            WHERE paper_id ~ '^[0-9]{5,}$'
            "#,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        max.map(|m| {
            u32::try_from(m).map_err(|_| StoreError::Corrupt(format!("paper serial {m}")))
        })
        .transpose()
    }

    async fn count_submissions_with_paper_id(&self) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE paper_id IS NOT NULL")
                .fetch_one(self.pool.as_ref())
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn create_submission(
        &self,
        new: &NewSubmission,
        paper_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let co_authors = if new.co_authors.is_empty() {
            None
        } else {
            Some(Json(new.co_authors.clone()))
        };

        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            INSERT INTO submissions (
                id, paper_id, name, email, phone, institution, country, orcid_id,
                paper_title, paper_abstract, keywords, primary_subject, co_authors,
                paper_file_url, supplementary_file_url, source_code_file_url,
                review_status, sent_to_committee, review_reminder_count, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                false, 0, $18, $18
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(paper_id)
        .bind(new.name.trim())
        .bind(new.email.trim())
        .bind(new.phone.trim())
        .bind(new.institution.trim())
        .bind(new.country.trim())
        .bind(new.orcid_id.as_deref().filter(|o| !o.is_empty()))
        .bind(new.paper_title.trim())
        .bind(new.paper_abstract.trim())
        .bind(new.keywords.trim())
        .bind(new.primary_subject.trim())
        .bind(co_authors)
        .bind(&new.paper_file_url)
        .bind(&new.supplementary_file_url)
        .bind(&new.source_code_file_url)
        .bind(ReviewStatus::Pending.as_str())
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        row.try_into()
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        sqlx::query_as::<_, SubmissionRow>("SELECT * FROM submissions WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Submission::try_from)
            .transpose()
    }

    async fn find_submission_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Submission>, StoreError> {
        sqlx::query_as::<_, SubmissionRow>("SELECT * FROM submissions WHERE email = $1")
            .bind(email.trim())
            .fetch_optional(self.pool.as_ref())
            .await?
            .map(Submission::try_from)
            .transpose()
    }

    async fn find_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM submissions");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(i64::from(offset));
        }

        qb.build_query_as::<SubmissionRow>()
            .fetch_all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(Submission::try_from)
            .collect()
    }

    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM submissions");
        push_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn update_submission(
        &self,
        id: Uuid,
        patch: SubmissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SubmissionRow>(
            "SELECT * FROM submissions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let mut submission = Submission::try_from(row)?;
        submission.apply(patch, now);

        let committee_members = if submission.committee_members.is_empty() {
            None
        } else {
            Some(Json(submission.committee_members.clone()))
        };

        sqlx::query(
            r#"
            UPDATE submissions
            SET review_status = $2,
                sent_to_committee = $3,
                committee_members = $4,
                review_reminder_count = $5,
                review_reminder_last_sent_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(submission.review_status.as_str())
        .bind(submission.sent_to_committee)
        .bind(committee_members)
        .bind(submission.review_reminder_count)
        .bind(submission.review_reminder_last_sent_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(submission)
    }

    async fn record_reminder_sent(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_reminders: i32,
    ) -> Result<Option<Submission>, StoreError> {
        sqlx::query_as::<_, SubmissionRow>(
            r#"
            UPDATE submissions
            SET review_reminder_count = review_reminder_count + 1,
                review_reminder_last_sent_at = $2,
                updated_at = $2
            WHERE id = $1
              AND sent_to_committee
              AND review_status = ANY($3)
              AND review_reminder_count < $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(awaiting_decision())
        .bind(max_reminders)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(Submission::try_from)
        .transpose()
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_active_committee_members(
        &self,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<CommitteeMember>, StoreError> {
        let members = match ids {
            None => {
                sqlx::query_as::<_, CommitteeMember>(
                    "SELECT * FROM committee_members WHERE is_active ORDER BY name",
                )
                .fetch_all(self.pool.as_ref())
                .await?
            }
            Some(ids) => {
                sqlx::query_as::<_, CommitteeMember>(
                    r#"
                    SELECT * FROM committee_members
                    WHERE is_active AND id = ANY($1)
                    ORDER BY name
                    "#,
                )
                .bind(ids.to_vec())
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };
        Ok(members)
    }

    async fn list_committee_members(&self) -> Result<Vec<CommitteeMember>, StoreError> {
        Ok(sqlx::query_as::<_, CommitteeMember>(
            "SELECT * FROM committee_members ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.as_ref())
        .await?)
    }

    async fn create_committee_member(
        &self,
        input: &CommitteeMemberInput,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError> {
        Ok(sqlx::query_as::<_, CommitteeMember>(
            r#"
            INSERT INTO committee_members (
                id, name, email, designation, institution, expertise, phone,
                is_active, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(input.email.trim())
        .bind(&input.designation)
        .bind(&input.institution)
        .bind(&input.expertise)
        .bind(&input.phone)
        .bind(input.is_active.unwrap_or(true))
        .bind(created_by)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?)
    }

    async fn update_committee_member(
        &self,
        id: Uuid,
        input: &CommitteeMemberInput,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError> {
        sqlx::query_as::<_, CommitteeMember>(
            r#"
            UPDATE committee_members
            SET name = $2,
                email = $3,
                designation = $4,
                institution = $5,
                expertise = $6,
                phone = $7,
                is_active = COALESCE($8, is_active),
                updated_at = $9
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.email.trim())
        .bind(&input.designation)
        .bind(&input.institution)
        .bind(&input.expertise)
        .bind(&input.phone)
        .bind(input.is_active)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_committee_member(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM committee_members WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_reviewer_expression(
        &self,
        new: &NewReviewerExpression,
        now: DateTime<Utc>,
    ) -> Result<ReviewerExpression, StoreError> {
        let expr = ReviewerExpression::from_new(new, Uuid::new_v4(), now);

        sqlx::query_as::<_, ReviewerExpressionRow>(
            r#"
            INSERT INTO reviewer_expressions (
                id, name, email, phone, current_job_title, institution, education,
                subject_area, methodological_expertise, research_interest,
                previous_peer_review_experience, conflict_of_interest, cv_url,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING *
            "#,
        )
        .bind(expr.id)
        .bind(&expr.name)
        .bind(&expr.email)
        .bind(&expr.phone)
        .bind(&expr.current_job_title)
        .bind(&expr.institution)
        .bind(Json(&expr.education))
        .bind(Json(&expr.subject_area))
        .bind(Json(&expr.methodological_expertise))
        .bind(Json(&expr.research_interest))
        .bind(&expr.previous_peer_review_experience)
        .bind(&expr.conflict_of_interest)
        .bind(&expr.cv_url)
        .bind(expr.status.as_str())
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?
        .try_into()
    }

    async fn get_reviewer_expression(
        &self,
        id: Uuid,
    ) -> Result<Option<ReviewerExpression>, StoreError> {
        sqlx::query_as::<_, ReviewerExpressionRow>(
            "SELECT * FROM reviewer_expressions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(ReviewerExpression::try_from)
        .transpose()
    }

    async fn list_reviewer_expressions(&self) -> Result<Vec<ReviewerExpression>, StoreError> {
        sqlx::query_as::<_, ReviewerExpressionRow>(
            "SELECT * FROM reviewer_expressions ORDER BY created_at DESC",
        )
        .fetch_all(self.pool.as_ref())
        .await?
        .into_iter()
        .map(ReviewerExpression::try_from)
        .collect()
    }

    async fn delete_reviewer_expression(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM reviewer_expressions WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_expression_status(
        &self,
        id: Uuid,
        status: ExpressionStatus,
        acting_admin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ExpressionStatusChange, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReviewerExpressionRow>(
            r#"
            UPDATE reviewer_expressions
            SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let expression = ReviewerExpression::try_from(row)?;

        let profile = match status {
            ExpressionStatus::Accepted => expression.committee_profile(),
            _ => None,
        };

        let committee_member = match profile {
            Some(profile) => Some(
                sqlx::query_as::<_, CommitteeMember>(
                    r#"
                    INSERT INTO committee_members (
                        id, name, email, designation, institution, expertise, phone,
                        is_active, created_by, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $9)
                    ON CONFLICT (email) DO UPDATE
                    SET name = EXCLUDED.name,
                        designation = EXCLUDED.designation,
                        institution = EXCLUDED.institution,
                        expertise = EXCLUDED.expertise,
                        phone = EXCLUDED.phone,
                        is_active = TRUE,
                        updated_at = EXCLUDED.updated_at
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&profile.name)
                .bind(&profile.email)
                .bind(&profile.designation)
                .bind(&profile.institution)
                .bind(&profile.expertise)
                .bind(&profile.phone)
                .bind(acting_admin)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?,
            ),
            None => None,
        };

        tx.commit().await?;

        Ok(ExpressionStatusChange {
            expression,
            committee_member,
        })
    }
}

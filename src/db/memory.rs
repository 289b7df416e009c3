//! In-memory implementation of `Store`.
//!
//! All records live in maps behind a single `RwLock`, so multi-record writes
//! are atomic. Test backend only.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CommitteeMember, CommitteeMemberInput, ExpressionStatusChange, NewReviewerExpression,
    NewSubmission, ReviewerExpression, Store, StoreError, Submission, SubmissionFilter,
    SubmissionPatch,
};
use crate::review::paper_id::paper_serial;
use crate::review::status::{ExpressionStatus, ReviewStatus};

#[derive(Default)]
struct Tables {
    submissions: HashMap<Uuid, Submission>,
    committee: HashMap<Uuid, CommitteeMember>,
    expressions: HashMap<Uuid, ReviewerExpression>,
    /// Paper ids taken by writers the serial scan cannot see yet.
    hidden_paper_ids: HashSet<String>,
    serial_scan_unavailable: bool,
    committee_upsert_unavailable: bool,
}

pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Marks paper ids as taken without making them visible to the serial scan,
    /// the way a concurrent writer that commits after our scan would.
    pub async fn reserve_hidden_paper_ids<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tables = self.tables.write().await;
        tables
            .hidden_paper_ids
            .extend(ids.into_iter().map(Into::into));
    }

    pub async fn set_serial_scan_unavailable(&self, unavailable: bool) {
        self.tables.write().await.serial_scan_unavailable = unavailable;
    }

    /// Makes the committee upsert of an accepted expression fail, as a dropped
    /// connection mid-transaction would.
    pub async fn set_committee_upsert_unavailable(&self, unavailable: bool) {
        self.tables.write().await.committee_upsert_unavailable = unavailable;
    }

    fn sorted_newest_first<T, F>(mut items: Vec<T>, created_at: F) -> Vec<T>
    where
        F: Fn(&T) -> DateTime<Utc>,
    {
        items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
        items
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn email_taken(
    committee: &HashMap<Uuid, CommitteeMember>,
    email: &str,
    except: Option<Uuid>,
) -> bool {
    committee
        .values()
        .any(|m| m.email == email && Some(m.id) != except)
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_max_paper_serial(&self) -> Result<Option<u32>, StoreError> {
        let tables = self.tables.read().await;
        if tables.serial_scan_unavailable {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(tables
            .submissions
            .values()
            .filter_map(|s| s.paper_id.as_deref())
            .filter_map(paper_serial)
            .max())
    }

    async fn count_submissions_with_paper_id(&self) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .filter(|s| s.paper_id.is_some())
            .count() as u64)
    }

    async fn create_submission(
        &self,
        new: &NewSubmission,
        paper_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let mut tables = self.tables.write().await;

        let email = new.email.trim();
        if tables.submissions.values().any(|s| s.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        if tables.hidden_paper_ids.contains(paper_id)
            || tables
                .submissions
                .values()
                .any(|s| s.paper_id.as_deref() == Some(paper_id))
        {
            return Err(StoreError::DuplicatePaperId);
        }

        let submission = Submission {
            id: Uuid::new_v4(),
            paper_id: Some(paper_id.to_string()),
            name: new.name.trim().to_string(),
            email: email.to_string(),
            phone: new.phone.trim().to_string(),
            institution: new.institution.trim().to_string(),
            country: new.country.trim().to_string(),
            orcid_id: new.orcid_id.clone().filter(|o| !o.is_empty()),
            paper_title: new.paper_title.trim().to_string(),
            paper_abstract: new.paper_abstract.trim().to_string(),
            keywords: new.keywords.trim().to_string(),
            primary_subject: new.primary_subject.trim().to_string(),
            co_authors: new.co_authors.clone(),
            paper_file_url: new.paper_file_url.clone(),
            supplementary_file_url: new.supplementary_file_url.clone(),
            source_code_file_url: new.source_code_file_url.clone(),
            review_status: ReviewStatus::Pending,
            sent_to_committee: false,
            committee_members: Vec::new(),
            review_reminder_count: 0,
            review_reminder_last_sent_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>, StoreError> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn find_submission_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Submission>, StoreError> {
        let email = email.trim();
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn find_submissions(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let matching: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();

        let offset = filter.offset.unwrap_or(0) as usize;
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(Self::sorted_newest_first(matching, |s| s.created_at)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn count_submissions(&self, filter: &SubmissionFilter) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .values()
            .filter(|s| filter.matches(s))
            .count() as u64)
    }

    async fn update_submission(
        &self,
        id: Uuid,
        patch: SubmissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let mut tables = self.tables.write().await;
        let submission = tables
            .submissions
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        submission.apply(patch, now);
        Ok(submission.clone())
    }

    async fn record_reminder_sent(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        max_reminders: i32,
    ) -> Result<Option<Submission>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(submission) = tables.submissions.get_mut(&id) else {
            return Ok(None);
        };
        let eligible = submission.sent_to_committee
            && ReviewStatus::AWAITING_DECISION.contains(&submission.review_status)
            && submission.review_reminder_count < max_reminders;
        if !eligible {
            return Ok(None);
        }
        submission.review_reminder_count += 1;
        submission.review_reminder_last_sent_at = Some(now);
        submission.updated_at = now;
        Ok(Some(submission.clone()))
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.submissions.remove(&id).is_some())
    }

    async fn find_active_committee_members(
        &self,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<CommitteeMember>, StoreError> {
        let tables = self.tables.read().await;
        let mut members: Vec<CommitteeMember> = tables
            .committee
            .values()
            .filter(|m| m.is_active)
            .filter(|m| ids.map_or(true, |ids| ids.contains(&m.id)))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn list_committee_members(&self) -> Result<Vec<CommitteeMember>, StoreError> {
        let tables = self.tables.read().await;
        let members = tables.committee.values().cloned().collect();
        Ok(Self::sorted_newest_first(members, |m: &CommitteeMember| m.created_at))
    }

    async fn create_committee_member(
        &self,
        input: &CommitteeMemberInput,
        created_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError> {
        let mut tables = self.tables.write().await;
        let email = input.email.trim();
        if email_taken(&tables.committee, email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        let member = CommitteeMember {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email: email.to_string(),
            designation: input.designation.clone(),
            institution: input.institution.clone(),
            expertise: input.expertise.clone(),
            phone: input.phone.clone(),
            is_active: input.is_active.unwrap_or(true),
            created_by,
            created_at: now,
            updated_at: now,
        };
        tables.committee.insert(member.id, member.clone());
        Ok(member)
    }

    async fn update_committee_member(
        &self,
        id: Uuid,
        input: &CommitteeMemberInput,
        now: DateTime<Utc>,
    ) -> Result<CommitteeMember, StoreError> {
        let mut tables = self.tables.write().await;
        let email = input.email.trim();
        if !tables.committee.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if email_taken(&tables.committee, email, Some(id)) {
            return Err(StoreError::DuplicateEmail);
        }

        let member = tables
            .committee
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        member.name = input.name.trim().to_string();
        member.email = email.to_string();
        member.designation = input.designation.clone();
        member.institution = input.institution.clone();
        member.expertise = input.expertise.clone();
        member.phone = input.phone.clone();
        if let Some(active) = input.is_active {
            member.is_active = active;
        }
        member.updated_at = now;
        Ok(member.clone())
    }

    async fn delete_committee_member(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.committee.remove(&id).is_some())
    }

    async fn create_reviewer_expression(
        &self,
        new: &NewReviewerExpression,
        now: DateTime<Utc>,
    ) -> Result<ReviewerExpression, StoreError> {
        let expr = ReviewerExpression::from_new(new, Uuid::new_v4(), now);
        self.tables
            .write()
            .await
            .expressions
            .insert(expr.id, expr.clone());
        Ok(expr)
    }

    async fn get_reviewer_expression(
        &self,
        id: Uuid,
    ) -> Result<Option<ReviewerExpression>, StoreError> {
        Ok(self.tables.read().await.expressions.get(&id).cloned())
    }

    async fn list_reviewer_expressions(&self) -> Result<Vec<ReviewerExpression>, StoreError> {
        let tables = self.tables.read().await;
        let all = tables.expressions.values().cloned().collect();
        Ok(Self::sorted_newest_first(all, |e: &ReviewerExpression| e.created_at))
    }

    async fn delete_reviewer_expression(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.expressions.remove(&id).is_some())
    }

    async fn apply_expression_status(
        &self,
        id: Uuid,
        status: ExpressionStatus,
        acting_admin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<ExpressionStatusChange, StoreError> {
        // One write guard spans both tables, so the pair lands together.
        let mut tables = self.tables.write().await;

        let mut expression = tables
            .expressions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        expression.status = status;
        expression.updated_at = now;

        let profile = match status {
            ExpressionStatus::Accepted => expression.committee_profile(),
            _ => None,
        };
        // Nothing has been written yet, so bailing out here leaves both tables as they were.
        if profile.is_some() && tables.committee_upsert_unavailable {
            return Err(StoreError::Unavailable(sqlx::Error::PoolClosed));
        }

        let committee_member = profile.map(|profile| {
            let existing = tables
                .committee
                .values()
                .find(|m| m.email == profile.email)
                .cloned();
            let member = match existing {
                Some(mut member) => {
                    member.name = profile.name;
                    member.designation = Some(profile.designation);
                    member.institution = Some(profile.institution);
                    member.expertise = Some(profile.expertise);
                    member.phone = profile.phone;
                    member.is_active = true;
                    member.updated_at = now;
                    member
                }
                None => CommitteeMember {
                    id: Uuid::new_v4(),
                    name: profile.name,
                    email: profile.email,
                    designation: Some(profile.designation),
                    institution: Some(profile.institution),
                    expertise: Some(profile.expertise),
                    phone: profile.phone,
                    is_active: true,
                    created_by: acting_admin,
                    created_at: now,
                    updated_at: now,
                },
            };
            tables.committee.insert(member.id, member.clone());
            member
        });

        tables.expressions.insert(id, expression.clone());

        Ok(ExpressionStatusChange {
            expression,
            committee_member,
        })
    }
}

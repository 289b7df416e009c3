use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::StoreError;
use crate::review::status::{ExpressionStatus, ReviewStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoAuthor {
    pub name: String,
    pub email: String,
    pub institution: String,
    pub country: String,
    #[serde(default)]
    pub orcid_id: Option<String>,
}

/// Point-in-time copy of a committee member taken when a paper is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeMemberSnapshot {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub paper_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
    pub country: String,
    pub orcid_id: Option<String>,
    pub paper_title: String,
    pub paper_abstract: String,
    pub keywords: String,
    pub primary_subject: String,
    pub co_authors: Vec<CoAuthor>,
    pub paper_file_url: Option<String>,
    pub supplementary_file_url: Option<String>,
    pub source_code_file_url: Option<String>,
    pub review_status: ReviewStatus,
    pub sent_to_committee: bool,
    pub committee_members: Vec<CommitteeMemberSnapshot>,
    pub review_reminder_count: i32,
    pub review_reminder_last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// Human-facing identifier for logs: the paper id once assigned.
    pub fn label(&self) -> String {
        self.paper_id.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Applies the mutable fields of `patch`; `updated_at` moves to `now`.
    pub fn apply(&mut self, patch: SubmissionPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.review_status {
            self.review_status = status;
        }
        if let Some(sent) = patch.sent_to_committee {
            self.sent_to_committee = sent;
        }
        if let Some(members) = patch.committee_members {
            self.committee_members = members.unwrap_or_default();
        }
        if let Some(count) = patch.review_reminder_count {
            self.review_reminder_count = count;
        }
        if let Some(last) = patch.review_reminder_last_sent_at {
            self.review_reminder_last_sent_at = last;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SubmissionRow {
    pub id: Uuid,
    pub paper_id: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
    pub country: String,
    pub orcid_id: Option<String>,
    pub paper_title: String,
    pub paper_abstract: String,
    pub keywords: String,
    pub primary_subject: String,
    pub co_authors: Option<Json<Vec<CoAuthor>>>,
    pub paper_file_url: Option<String>,
    pub supplementary_file_url: Option<String>,
    pub source_code_file_url: Option<String>,
    pub review_status: String,
    pub sent_to_committee: bool,
    pub committee_members: Option<Json<Vec<CommitteeMemberSnapshot>>>,
    pub review_reminder_count: i32,
    pub review_reminder_last_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let review_status = row
            .review_status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("review status {:?}", row.review_status)))?;

        Ok(Submission {
            id: row.id,
            paper_id: row.paper_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            institution: row.institution,
            country: row.country,
            orcid_id: row.orcid_id,
            paper_title: row.paper_title,
            paper_abstract: row.paper_abstract,
            keywords: row.keywords,
            primary_subject: row.primary_subject,
            co_authors: row.co_authors.map(|j| j.0).unwrap_or_default(),
            paper_file_url: row.paper_file_url,
            supplementary_file_url: row.supplementary_file_url,
            source_code_file_url: row.source_code_file_url,
            review_status,
            sent_to_committee: row.sent_to_committee,
            committee_members: row.committee_members.map(|j| j.0).unwrap_or_default(),
            review_reminder_count: row.review_reminder_count,
            review_reminder_last_sent_at: row.review_reminder_last_sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated intake payload. File fields carry already-uploaded URLs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub institution: String,
    pub country: String,
    pub orcid_id: Option<String>,
    pub paper_title: String,
    pub paper_abstract: String,
    pub keywords: String,
    pub primary_subject: String,
    pub co_authors: Vec<CoAuthor>,
    pub paper_file_url: Option<String>,
    pub supplementary_file_url: Option<String>,
    pub source_code_file_url: Option<String>,
    pub agree_terms: bool,
    pub agree_review: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionPatch {
    pub review_status: Option<ReviewStatus>,
    pub sent_to_committee: Option<bool>,
    /// `Some(None)` clears the snapshot.
    pub committee_members: Option<Option<Vec<CommitteeMemberSnapshot>>>,
    pub review_reminder_count: Option<i32>,
    pub review_reminder_last_sent_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub statuses: Option<Vec<ReviewStatus>>,
    pub sent_to_committee: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl SubmissionFilter {
    /// Everything the reminder scheduler has to look at.
    pub fn awaiting_decision() -> Self {
        Self {
            statuses: Some(ReviewStatus::AWAITING_DECISION.to_vec()),
            sent_to_committee: Some(true),
            ..Default::default()
        }
    }

    /// In-process evaluation of the filter, mirroring `PgStore`'s WHERE clause.
    #[cfg(test)]
    pub fn matches(&self, submission: &Submission) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&submission.review_status) {
                return false;
            }
        }
        if let Some(sent) = self.sent_to_committee {
            if submission.sent_to_committee != sent {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = [
                &submission.name,
                &submission.email,
                &submission.paper_title,
                &submission.institution,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeMember {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub designation: Option<String>,
    pub institution: Option<String>,
    pub expertise: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeMemberInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub expertise: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// A list-valued form field. Clients send a JSON array, a JSON array encoded
/// as a string, or a comma separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListField {
    List(Vec<String>),
    Text(String),
}

impl Default for ListField {
    fn default() -> Self {
        ListField::List(Vec::new())
    }
}

impl ListField {
    pub fn into_vec(self) -> Vec<String> {
        let items = match self {
            ListField::List(items) => items,
            ListField::Text(text) => {
                let text = text.trim();
                if text.starts_with('[') && text.ends_with(']') {
                    if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(text) {
                        return items
                            .into_iter()
                            .map(|v| match v {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            })
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                    }
                }
                text.split(',').map(str::to_string).collect()
            }
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReviewerExpression {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub current_job_title: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub education: ListField,
    #[serde(default)]
    pub subject_area: ListField,
    #[serde(default)]
    pub methodological_expertise: ListField,
    #[serde(default)]
    pub research_interest: ListField,
    #[serde(default)]
    pub previous_peer_review_experience: Option<String>,
    #[serde(default)]
    pub conflict_of_interest: Option<String>,
    #[serde(default)]
    pub cv_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerExpression {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_job_title: String,
    pub institution: String,
    pub education: Vec<String>,
    pub subject_area: Vec<String>,
    pub methodological_expertise: Vec<String>,
    pub research_interest: Vec<String>,
    pub previous_peer_review_experience: Option<String>,
    pub conflict_of_interest: Option<String>,
    pub cv_url: Option<String>,
    pub status: ExpressionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewerExpression {
    pub fn from_new(
        new: &NewReviewerExpression,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> ReviewerExpression {
        ReviewerExpression {
            id,
            name: new.name.trim().to_string(),
            email: new
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            phone: new.phone.clone(),
            current_job_title: new.current_job_title.trim().to_string(),
            institution: new.institution.trim().to_string(),
            education: new.education.clone().into_vec(),
            subject_area: new.subject_area.clone().into_vec(),
            methodological_expertise: new.methodological_expertise.clone().into_vec(),
            research_interest: new.research_interest.clone().into_vec(),
            previous_peer_review_experience: new.previous_peer_review_experience.clone(),
            conflict_of_interest: new.conflict_of_interest.clone(),
            cv_url: new.cv_url.clone(),
            status: ExpressionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Directory fields copied into the committee on acceptance.
    pub fn committee_profile(&self) -> Option<CommitteeProfile> {
        let email = self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        Some(CommitteeProfile {
            name: self.name.clone(),
            email: email.to_string(),
            designation: self.current_job_title.clone(),
            institution: self.institution.clone(),
            expertise: self.subject_area.join(", "),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ReviewerExpressionRow {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub current_job_title: String,
    pub institution: String,
    pub education: Json<Vec<String>>,
    pub subject_area: Json<Vec<String>>,
    pub methodological_expertise: Json<Vec<String>>,
    pub research_interest: Json<Vec<String>>,
    pub previous_peer_review_experience: Option<String>,
    pub conflict_of_interest: Option<String>,
    pub cv_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewerExpressionRow> for ReviewerExpression {
    type Error = StoreError;

    fn try_from(row: ReviewerExpressionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("expression status {:?}", row.status)))?;

        Ok(ReviewerExpression {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            current_job_title: row.current_job_title,
            institution: row.institution,
            education: row.education.0,
            subject_area: row.subject_area.0,
            methodological_expertise: row.methodological_expertise.0,
            research_interest: row.research_interest.0,
            previous_peer_review_experience: row.previous_peer_review_experience,
            conflict_of_interest: row.conflict_of_interest,
            cv_url: row.cv_url,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitteeProfile {
    pub name: String,
    pub email: String,
    pub designation: String,
    pub institution: String,
    pub expertise: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionStatusChange {
    pub expression: ReviewerExpression,
    pub committee_member: Option<CommitteeMember>,
}

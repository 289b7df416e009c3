use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{ok, respond, ApiResponse};
use crate::db::{NewSubmission, SubmissionFilter};
use crate::error::AppError;
use crate::review::{submit_paper, ReviewStatus};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

pub async fn register_speaker(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewSubmission>,
) -> Result<ApiResponse, AppError> {
    let submission = submit_paper(
        state.store.as_ref(),
        &state.notifier,
        state.clock.as_ref(),
        new,
    )
    .await?;

    Ok(respond(
        StatusCode::CREATED,
        "Paper submitted successfully",
        json!({
            "id": submission.id,
            "paperId": submission.paper_id,
            "paperTitle": submission.paper_title,
            "reviewStatus": submission.review_status,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeakerQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    search: Option<String>,
}

impl SpeakerQuery {
    fn filter(&self) -> Result<SubmissionFilter, AppError> {
        let statuses = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("ALL") => None,
            Some(raw) => Some(vec![raw.parse::<ReviewStatus>()?]),
        };
        Ok(SubmissionFilter {
            statuses,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..Default::default()
        })
    }
}

pub async fn list_speakers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SpeakerQuery>,
) -> Result<ApiResponse, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let filter = query.filter()?;
    let total = state.store.count_submissions(&filter).await?;
    let speakers = state
        .store
        .find_submissions(&SubmissionFilter {
            limit: Some(limit),
            offset: Some((page - 1).saturating_mul(limit)),
            ..filter
        })
        .await?;

    Ok(ok(json!({
        "speakers": speakers,
        "pagination": {
            "currentPage": page,
            "totalPages": total.div_ceil(u64::from(limit)),
            "totalItems": total,
            "itemsPerPage": limit,
        },
    })))
}

pub async fn get_speaker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse, AppError> {
    let submission = state
        .store
        .get_submission(id)
        .await?
        .ok_or(AppError::NotFound("Speaker"))?;
    Ok(ok(submission))
}

pub async fn delete_speaker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse, AppError> {
    if !state.store.delete_submission(id).await? {
        return Err(AppError::NotFound("Speaker"));
    }
    tracing::info!(submission_id = %id, "Submission deleted");
    Ok(respond(StatusCode::OK, "Speaker deleted successfully", ()))
}

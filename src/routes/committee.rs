use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{ok, respond, ApiResponse};
use crate::db::{CommitteeMemberInput, StoreError};
use crate::error::AppError;
use crate::review::intake::is_valid_email;
use crate::review::{self, Recipients};
use crate::state::AppState;

fn check_member(input: &CommitteeMemberInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() || input.email.trim().is_empty() {
        return Err(AppError::Validation("Name and email are required".to_string()));
    }
    if !is_valid_email(&input.email) {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

fn member_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::DuplicateEmail => {
            AppError::Conflict("Committee member with this email already exists".to_string())
        }
        other => other.into(),
    }
}

pub async fn list_members(State(state): State<Arc<AppState>>) -> Result<ApiResponse, AppError> {
    Ok(ok(state.store.list_committee_members().await?))
}

pub async fn list_active_members(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse, AppError> {
    Ok(ok(state.store.find_active_committee_members(None).await?))
}

pub async fn create_member(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CommitteeMemberInput>,
) -> Result<ApiResponse, AppError> {
    check_member(&input)?;
    let member = state
        .store
        .create_committee_member(&input, None, state.clock.now())
        .await
        .map_err(member_conflict)?;
    tracing::info!(member_id = %member.id, "Committee member added");
    Ok(respond(
        StatusCode::CREATED,
        "Committee member added successfully",
        member,
    ))
}

pub async fn update_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<CommitteeMemberInput>,
) -> Result<ApiResponse, AppError> {
    check_member(&input)?;
    let member = state
        .store
        .update_committee_member(id, &input, state.clock.now())
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("Committee member"),
            other => member_conflict(other),
        })?;
    Ok(respond(
        StatusCode::OK,
        "Committee member updated successfully",
        member,
    ))
}

pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse, AppError> {
    if !state.store.delete_committee_member(id).await? {
        return Err(AppError::NotFound("Committee member"));
    }
    Ok(respond(
        StatusCode::OK,
        "Committee member deleted successfully",
        (),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendRequest {
    committee_ids: Option<Vec<Uuid>>,
    send_to_all: bool,
}

impl SendRequest {
    fn recipients(self) -> Recipients {
        if self.send_to_all {
            Recipients::AllActive
        } else {
            Recipients::Selected(self.committee_ids.unwrap_or_default())
        }
    }
}

pub async fn send_to_committee(
    State(state): State<Arc<AppState>>,
    Path(speaker_id): Path<Uuid>,
    Json(request): Json<SendRequest>,
) -> Result<ApiResponse, AppError> {
    let outcome = review::send_to_committee(
        state.store.as_ref(),
        &state.notifier,
        state.clock.as_ref(),
        speaker_id,
        request.recipients(),
    )
    .await?;

    let message = format!(
        "Paper sent to {} committee member(s)",
        outcome.sent_to_members
    );
    Ok(respond(StatusCode::OK, &message, outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(default)]
    review_status: String,
}

pub async fn update_speaker_status(
    State(state): State<Arc<AppState>>,
    Path(speaker_id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<ApiResponse, AppError> {
    let submission = review::update_review_status(
        state.store.as_ref(),
        state.clock.as_ref(),
        speaker_id,
        &request.review_status,
    )
    .await
    .map_err(|e| match e {
        AppError::Store(StoreError::NotFound) => AppError::NotFound("Speaker"),
        other => other,
    })?;

    Ok(respond(
        StatusCode::OK,
        "Review status updated successfully",
        json!({
            "id": submission.id,
            "paperId": submission.paper_id,
            "reviewStatus": submission.review_status,
            "sentToCommittee": submission.sent_to_committee,
        }),
    ))
}

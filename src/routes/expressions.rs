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
use crate::db::{NewReviewerExpression, StoreError};
use crate::error::AppError;
use crate::review::{self, intake::is_valid_email};
use crate::state::AppState;

fn check_expression(new: &NewReviewerExpression) -> Result<(), AppError> {
    let missing: Vec<&str> = [
        ("name", &new.name),
        ("currentJobTitle", &new.current_job_title),
        ("institution", &new.institution),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    match new.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() && !is_valid_email(email) => {
            Err(AppError::Validation("Invalid email format".to_string()))
        }
        _ => Ok(()),
    }
}

pub async fn create_expression(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewReviewerExpression>,
) -> Result<ApiResponse, AppError> {
    check_expression(&new)?;
    let expression = state
        .store
        .create_reviewer_expression(&new, state.clock.now())
        .await?;
    tracing::info!(expression_id = %expression.id, "Reviewer expression received");
    Ok(respond(
        StatusCode::CREATED,
        "Expression of interest submitted successfully",
        expression,
    ))
}

pub async fn list_expressions(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse, AppError> {
    Ok(ok(state.store.list_reviewer_expressions().await?))
}

pub async fn get_expression(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse, AppError> {
    let expression = state
        .store
        .get_reviewer_expression(id)
        .await?
        .ok_or(AppError::NotFound("Reviewer expression"))?;
    Ok(ok(expression))
}

pub async fn delete_expression(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse, AppError> {
    if !state.store.delete_reviewer_expression(id).await? {
        return Err(AppError::NotFound("Reviewer expression"));
    }
    Ok(respond(
        StatusCode::OK,
        "Reviewer expression deleted successfully",
        (),
    ))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    status: String,
}

pub async fn update_expression_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<ApiResponse, AppError> {
    let change = review::update_expression_status(
        state.store.as_ref(),
        state.clock.as_ref(),
        id,
        &request.status,
        None,
    )
    .await
    .map_err(|e| match e {
        AppError::Store(StoreError::NotFound) => AppError::NotFound("Reviewer expression"),
        other => other,
    })?;

    Ok(respond(
        StatusCode::OK,
        "Status updated successfully",
        json!({
            "expression": change.expression,
            "syncedToCommittee": change.committee_member.is_some(),
            "committeeMember": change.committee_member,
        }),
    ))
}

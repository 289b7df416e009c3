mod committee;
mod expressions;
mod submissions;

pub use committee::{
    create_member, delete_member, list_active_members, list_members, send_to_committee,
    update_member, update_speaker_status,
};
pub use expressions::{
    create_expression, delete_expression, get_expression, list_expressions,
    update_expression_status,
};
pub use submissions::{delete_speaker, get_speaker, list_speakers, register_speaker};

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

pub type ApiResponse = (StatusCode, Json<Value>);

/// `{"success": true, "message": ..., "data": ...}`
pub fn respond<T: Serialize>(status: StatusCode, message: &str, data: T) -> ApiResponse {
    (
        status,
        Json(json!({ "success": true, "message": message, "data": data })),
    )
}

pub fn ok<T: Serialize>(data: T) -> ApiResponse {
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResponse {
    ok(json!({
        "status": "ok",
        "conference": state.config.conference_name,
        "mailerBlockedUntil": state.notifier.guard().blocked_until(),
    }))
}

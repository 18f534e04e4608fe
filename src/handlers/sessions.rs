//! Read-only session lookups for external collaborators (history,
//! meeting summaries). The registry holds snapshots only; nothing here
//! can affect a live session.

use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn list_sessions(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let snapshots = state.sessions.snapshots();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "count": snapshots.len(),
        "sessions": snapshots
    })))
}

pub async fn get_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let session_id = path.into_inner();

    match state.sessions.get(&session_id) {
        Some(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        None => Err(AppError::NotFound(format!(
            "session '{}' not found",
            session_id
        ))),
    }
}

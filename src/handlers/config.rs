use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// The upstream credentials are write-only: they can be set through the
/// environment but are never echoed back.
fn config_view(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "upstream": {
            "ws_url": config.upstream.ws_url,
            "resource_id": config.upstream.resource_id,
            "configured": config.upstream_configured()
        },
        "audio": {
            "source_format": config.audio.source_format,
            "source_rate": config.audio.source_rate,
            "source_bits": config.audio.source_bits,
            "source_channels": config.audio.source_channels,
            "target_format": config.audio.target_format,
            "target_rate": config.audio.target_rate,
            "mode": config.audio.mode
        },
        "session": {
            "max_concurrent_sessions": config.session.max_concurrent_sessions,
            "finish_grace_ms": config.session.finish_grace_ms
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_view(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_view(&current_config)
    })))
}

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use df_pipeline::{check_health, Health};
use tracing::debug;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.current_status();
    let check = check_health(state.storage.as_ref(), &status).await;
    let code = match check.status {
        Health::Down => {
            debug!("Health check reports down: {:?}", check.detail);
            StatusCode::SERVICE_UNAVAILABLE
        }
        Health::Up | Health::Unknown => StatusCode::OK,
    };
    (code, Json(check))
}

pub async fn pipeline_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.current_status())
}

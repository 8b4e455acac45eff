use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use axum::routing::post;
use ranger_core::actions::ActionOutput;
use ranger_core::models::{ActionId, IntegrationId};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ExecuteActionRequest {
    pub integration_id: IntegrationId,
    pub action_id: String,
    #[serde(default)]
    pub config_overrides: Option<serde_json::Value>,
}

pub fn router() -> axum::Router {
    axum::Router::new().route("/actions/execute", post(execute_action))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn execute_action(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ExecuteActionRequest>,
) -> Result<Json<ActionOutput>, ApiError> {
    let action: ActionId = req.action_id.parse()?;
    let out = state
        .runner
        .execute(req.integration_id, action, req.config_overrides)
        .await?;
    Ok(Json(out))
}

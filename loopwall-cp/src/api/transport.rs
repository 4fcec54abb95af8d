//! Transport control endpoint
//!
//! One entry point for all eight command kinds. The body is parsed by hand
//! so an unknown command type is rejected as a validation error before it
//! reaches the state machine.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError};
use crate::db::displays;
use crate::display::commands::{dispatch_command, DispatchOutcome, TransportCommand};
use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    status: String,
    /// Present when the command went through the command log
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<i64>,
}

/// POST /displays/:display_id/command - Issue a transport command
pub async fn issue_command(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command: TransportCommand = serde_json::from_value(body)
        .map_err(|e| error_response(Error::InvalidInput(format!("Unknown or malformed command: {}", e))))?;
    command.validate().map_err(error_response)?;

    // 404 before any state machine work
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let outcome = dispatch_command(&ctx.db_pool, &ctx.state, display_id, command.clone())
        .await
        .map_err(error_response)?;

    info!("Command {} for display {}: {:?}", command.kind(), display_id, outcome);
    let seq = match outcome {
        DispatchOutcome::Applied => None,
        DispatchOutcome::Queued { seq } => Some(seq),
    };
    Ok(Json(CommandResponse { status: "ok".to_string(), seq }))
}

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use conveyor_dispatch::Job;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub uid: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// POST /jobs
/// Accept a job for delivery: register it in the pending store and hand it
/// to the worker pool. Acceptance is the last the caller hears about it.
pub async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.uid.is_empty() {
        return Err(ApiError::bad_request("uid is required"));
    }

    let job = Job {
        uid: request.uid,
        data: request.data,
        content_type: request.content_type,
    };
    let uid = job.uid.clone();

    let Some(pending) = state.store.add(job) else {
        // An entry for this uid is already pending and keeps its original
        // payload; the resubmitted payload is discarded. Accept without
        // launching a second loop.
        warn!(uid = %uid, "job already pending; resubmitted payload discarded");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "message": "job already pending", "uid": uid })),
        ));
    };

    if let Err(err) = state.pool.submit(pending) {
        // Roll the registration back so a rejected submission never grows
        // the store.
        warn!(uid = %uid, error = %err, "job queue full; rejecting submission");
        state.store.remove(&uid);
        return Err(ApiError::QueueFull { uid });
    }

    info!(uid = %uid, "job accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "job accepted", "uid": uid })),
    ))
}

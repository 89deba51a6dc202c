//! Event submission handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Json},
    http::StatusCode,
};
use eventline_types::Event;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::AppState;

/// Request body for `POST /events/bulk`.
#[derive(Debug, Deserialize)]
pub struct BulkEventRequest {
    pub events: Vec<Event>,
}

/// Response body for accepted submissions.
#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub status: String,
    /// Number of events accepted; present for bulk submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl AcceptedResponse {
    fn new(count: Option<usize>) -> Self {
        Self {
            status: "accepted".to_string(),
            count,
        }
    }
}

/// Handler for `POST /events`.
pub async fn post_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<Event>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let Json(event) = payload?;
    event.validate()?;

    state.ingestion.process_one(&event).await?;

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::new(None))))
}

/// Handler for `POST /events/bulk`.
pub async fn post_event_bulk_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<BulkEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let Json(request) = payload?;
    let events = request.events;

    if events.is_empty() {
        return Err(ApiError::BadRequest("events must not be empty".to_string()));
    }
    if events.len() > state.max_batch_size {
        return Err(ApiError::BadRequest(format!(
            "batch of {} events exceeds the limit of {}",
            events.len(),
            state.max_batch_size
        )));
    }
    for (index, event) in events.iter().enumerate() {
        event
            .validate()
            .map_err(|e| ApiError::BadRequest(format!("event at index {index}: {e}")))?;
    }

    state.ingestion.process_many(&events).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse::new(Some(events.len()))),
    ))
}

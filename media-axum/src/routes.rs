use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use media_core::MediaError;
use media_queue::{decode_inbound, DispatchOutcome};
use media_service::{
    blob_failure, CompleteUpload, MediaRecord, SignedUpload, UploadRequest, UploadTicket, WorkflowError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{AuthContext, MediaAxumError, MediaAxumState};

type ApiResult<T> = Result<Json<T>, MediaAxumError>;

fn map_json_rejection(rejection: JsonRejection) -> MediaAxumError {
    MediaError::bad_request("Failed to parse the request body as JSON")
        .with_code("media/request/invalid")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into()
}

/// Response of a successful complete
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub id: String,
    pub url: String,
    pub size_bytes: u64,
}

impl From<MediaRecord> for CompletedUpload {
    fn from(record: MediaRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            size_bytes: record.size_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BlurRequest {
    #[serde(rename = "imageID", alias = "mediaID")]
    pub image_id: String,

    #[serde(rename = "profileID", alias = "subjectID", default)]
    pub profile_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BlurResponse {
    #[serde(rename = "derivativeID")]
    pub derivative_id: String,

    #[serde(rename = "blurredImageID")]
    pub blurred_image_id: String,

    pub created: bool,
}

pub async fn initiate_upload(
    State(state): State<MediaAxumState>,
    auth: AuthContext,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<UploadTicket> {
    let Json(request) = body.map_err(map_json_rejection)?;
    let ticket = state.app.media.initiate_upload(&auth.owner_id, request).await?;
    Ok(Json(ticket))
}

pub async fn complete_upload(
    State(state): State<MediaAxumState>,
    auth: AuthContext,
    body: Result<Json<CompleteUpload>, JsonRejection>,
) -> ApiResult<CompletedUpload> {
    let Json(request) = body.map_err(map_json_rejection)?;
    let record = state.app.media.complete_upload(&auth.owner_id, request).await?;
    Ok(Json(record.into()))
}

pub async fn issue_upload_url(
    State(state): State<MediaAxumState>,
    auth: AuthContext,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<SignedUpload> {
    let Json(request) = body.map_err(map_json_rejection)?;
    let signed = state.app.media.issue_upload_url(&auth.owner_id, request).await?;
    Ok(Json(signed))
}

pub async fn get_media(State(state): State<MediaAxumState>, Path(id): Path<String>) -> ApiResult<MediaRecord> {
    let record = state.app.media.get_media(&id).await?;
    Ok(Json(record))
}

/// Push endpoint. Anything but a retryable failure is acknowledged so the
/// transport stops redelivering it.
pub async fn receive_event(State(state): State<MediaAxumState>, body: Bytes) -> ApiResult<Value> {
    let envelope = match decode_inbound(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "dropping undecodable event");
            return Ok(Json(json!({"status": "rejected", "reason": err.to_string()})));
        }
    };

    let outcome = state.app.handlers.dispatch(&envelope).await;
    let status = match outcome {
        DispatchOutcome::Acked => "acked",
        DispatchOutcome::Ignored => "ignored",
        DispatchOutcome::Rejected(_) => "rejected",
        DispatchOutcome::Retry(reason) => {
            return Err(MediaError::unavailable(reason)
                .with_code("media/events/retry")
                .with_data(json!({"type": envelope.event_type}))
                .into());
        }
    };
    Ok(Json(json!({"status": status, "type": envelope.event_type})))
}

/// Synchronous derive trigger for internal callers
pub async fn derive_blur(
    State(state): State<MediaAxumState>,
    body: Result<Json<BlurRequest>, JsonRejection>,
) -> ApiResult<BlurResponse> {
    let Json(request) = body.map_err(map_json_rejection)?;
    let subject_id = request.profile_id.as_deref().filter(|s| !s.trim().is_empty());

    let outcome = state
        .app
        .workflow
        .run(&request.image_id, subject_id)
        .await
        .map_err(workflow_failure)?;

    info!(media_id = %request.image_id, derivative_id = %outcome.derivative.id, "direct derive finished");
    Ok(Json(BlurResponse {
        derivative_id: outcome.derivative.id.clone(),
        blurred_image_id: outcome.derivative.id,
        created: outcome.created,
    }))
}

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

fn workflow_failure(err: WorkflowError) -> MediaAxumError {
    let step = err.step();
    let media = match err {
        WorkflowError::Upload(blob) => return blob_failure(blob).into(),
        WorkflowError::SourceNotFound(id) => {
            MediaError::not_found(format!("Media record {id} not found")).with_code("media/record/not-found")
        }
        WorkflowError::InvalidEvent(msg) => MediaError::bad_request(msg),
        err @ (WorkflowError::SourceLayout(_) | WorkflowError::Transform(_)) => {
            MediaError::unprocessable(err.to_string()).with_code(format!("media/derivative/{step}-failed"))
        }
        err @ (WorkflowError::Records(_) | WorkflowError::Fetch(_) | WorkflowError::Link(_)) => {
            MediaError::bad_gateway(err.to_string()).with_code(format!("media/derivative/{step}-failed"))
        }
    };
    media.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_failures_keep_their_step_in_the_code() {
        let err = MediaError::normalize(workflow_failure(WorkflowError::Fetch("reset".into())).0);
        assert_eq!(err.status(), 502);
        assert_eq!(err.code, "media/derivative/fetch-failed");

        let err = MediaError::normalize(workflow_failure(WorkflowError::SourceNotFound("m1".into())).0);
        assert_eq!(err.status(), 404);

        let err = MediaError::normalize(workflow_failure(WorkflowError::Transform("bad jpeg".into())).0);
        assert_eq!(err.status(), 422);
        assert_eq!(err.code, "media/derivative/transform-failed");
    }
}

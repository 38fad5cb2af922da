use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use media_core::MediaError;
use tracing::error;

#[derive(Debug)]
pub struct MediaAxumError(pub anyhow::Error);

impl From<anyhow::Error> for MediaAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<MediaError> for MediaAxumError {
    fn from(e: MediaError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for MediaAxumError {
    fn into_response(self) -> Response {
        // A MediaError anywhere in the chain keeps its status and stable code
        let media = match MediaError::from_anyhow(&self.0) {
            Some(media) => media.sanitize_for_client(),
            None => MediaError::general_error(self.0.to_string()),
        };

        if media.kind.is_server_side() {
            error!(code = %media.code, error = %self.0, "request failed");
        }

        let status = StatusCode::from_u16(media.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(media.to_json())).into_response()
    }
}

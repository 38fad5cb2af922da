use media_blob::BlobError;
use media_core::MediaError;
use serde_json::json;

/// Convert a storage-layer failure into a client-facing error with a stable code.
pub fn blob_failure(err: BlobError) -> anyhow::Error {
    let message = err.to_string();
    let mapped = match &err {
        BlobError::Invalid { .. } => MediaError::bad_request(message).with_code("media/request/invalid"),
        BlobError::UnsupportedContentType { content_type } => MediaError::bad_request(message)
            .with_code("media/upload/unsupported-content-type")
            .with_data(json!({ "contentType": content_type })),
        BlobError::IncompleteParts { missing } => MediaError::bad_request(message)
            .with_code("media/upload/incomplete-parts")
            .with_data(json!({ "missing": missing })),
        BlobError::DuplicatePart { part_number } => MediaError::bad_request(message)
            .with_code("media/upload/duplicate-part")
            .with_data(json!({ "partNumber": part_number })),
        BlobError::PartOutOfRange { part_number, part_count } => MediaError::bad_request(message)
            .with_code("media/upload/part-out-of-range")
            .with_data(json!({ "partNumber": part_number, "partsCount": part_count })),
        BlobError::SessionClosed { .. } => MediaError::gone(message).with_code("media/upload/session-closed"),
        BlobError::NotFound { .. } => MediaError::not_found(message).with_code("media/storage/not-found"),
        BlobError::Store { stage, key, .. } => MediaError::bad_gateway(message)
            .with_code(format!("media/storage/{stage}-failed"))
            .with_data(json!({ "stage": stage.to_string(), "key": key })),
        BlobError::Timeout { stage, key, .. } => MediaError::timeout(message)
            .with_code("media/storage/timeout")
            .with_data(json!({ "stage": stage.to_string(), "key": key })),
        BlobError::PartsFailed { key, report } => MediaError::bad_gateway(message)
            .with_code("media/upload/parts-failed")
            .with_data(json!({ "key": key, "failedParts": report.failed_parts() })),
    };
    mapped.with_source(anyhow::Error::new(err)).into_anyhow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_blob::Stage;

    fn code_of(err: anyhow::Error) -> (u16, String) {
        let media = MediaError::normalize(err);
        (media.status(), media.code)
    }

    #[test]
    fn integrity_errors_are_client_errors() {
        let (status, code) = code_of(blob_failure(BlobError::IncompleteParts { missing: vec![2] }));
        assert_eq!(status, 400);
        assert_eq!(code, "media/upload/incomplete-parts");
    }

    #[test]
    fn store_errors_carry_stage_in_code() {
        let err = BlobError::store_message(Stage::Complete, "k", "EntityTooSmall");
        let (status, code) = code_of(blob_failure(err));
        assert_eq!(status, 502);
        assert_eq!(code, "media/storage/complete-failed");
    }

    #[test]
    fn closed_sessions_are_gone() {
        let (status, code) = code_of(blob_failure(BlobError::session_closed("upl_1")));
        assert_eq!(status, 410);
        assert_eq!(code, "media/upload/session-closed");
    }
}

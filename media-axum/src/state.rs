use std::sync::Arc;

use media_service::MediaApp;

#[derive(Clone)]
pub struct MediaAxumState {
    pub app: Arc<MediaApp>,
}

impl MediaAxumState {
    pub fn new(app: MediaApp) -> Self {
        Self { app: Arc::new(app) }
    }
}

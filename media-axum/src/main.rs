use anyhow::Result;
use media_blob::MemoryObjectStore;
use media_core::MediaConfig;
use media_service::{MediaApp, MediaSettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = MediaConfig::new();
    config.load_env("MEDIA__");
    let snapshot = config.snapshot();

    let settings = MediaSettings::from_config(&snapshot)?;
    let addr = settings.listen_addr();

    let app = if snapshot.get_bool("storage.in_memory").unwrap_or(false) {
        warn!("storage.in_memory is set, nothing survives a restart");
        let store = MemoryObjectStore::new().with_min_part_size(settings.min_part_size);
        let (app, _handles) = MediaApp::in_memory(settings, store)?;
        app
    } else {
        MediaApp::connect(settings).await?
    };

    info!(handlers = ?app.handlers.registered_types(), "media app ready");
    media_axum::axum(app).listen(addr).await
}

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use media_service::MediaApp;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::trust_owner_header;
use crate::routes;
use crate::MediaAxumState;

pub struct MediaAxum {
    pub app: Arc<MediaApp>,
    pub router: Router<()>,
}

impl Clone for MediaAxum {
    fn clone(&self) -> Self {
        Self {
            app: Arc::clone(&self.app),
            router: self.router.clone(),
        }
    }
}

impl MediaAxum {
    pub fn new(app: MediaApp) -> Self {
        let state = MediaAxumState::new(app);
        let app = Arc::clone(&state.app);
        Self {
            router: media_router(state),
            app,
        }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "media service listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(app: MediaApp) -> MediaAxum {
    MediaAxum::new(app)
}

/// Every route plus request-id and trace layers
pub fn media_router(state: MediaAxumState) -> Router<()> {
    let trust_header = state.app.settings.trust_owner_header;

    let mut router = Router::new()
        .route("/media/uploads", post(routes::initiate_upload))
        .route("/media/uploads/complete", post(routes::complete_upload))
        .route("/media/upload-url", post(routes::issue_upload_url))
        .route("/media/{id}", get(routes::get_media))
        .route("/internal/events", post(routes::receive_event))
        .route("/internal/media/blur", post(routes::derive_blur))
        .route("/health", get(routes::health))
        .with_state(state);

    if trust_header {
        router = router.layer(middleware::from_fn(trust_owner_header));
    }

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

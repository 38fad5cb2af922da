use std::sync::Arc;

use anyhow::Result;
use media_blob::{
    DefaultKeyStrategy, DefaultUploadCoordinator, HttpTransferClient, MediaObjectStore, MemoryObjectStore,
    MemoryTransferClient, PartTransferExecutor, S3Store, TransferClient,
};
use media_core::EntityRegistry;
use media_queue::{EventChannel, HandlerRegistry, HttpPushChannel, MemoryChannel};
use tracing::info;

use crate::fetch::{HttpFetcher, MemoryFetcher, SourceFetcher};
use crate::records::{MediaRecordStore, MemoryMediaRecordStore};
use crate::service::MediaService;
use crate::settings::MediaSettings;
use crate::subjects::{MemorySubjectMediaStore, SubjectMediaStore};
use crate::transform::BlurTransform;
use crate::workflow::DerivativeWorkflow;

/// Long-lived collaborators, constructed once at startup
pub struct MediaApp {
    pub settings: MediaSettings,
    pub media: Arc<MediaService>,
    pub workflow: Arc<DerivativeWorkflow>,
    pub handlers: Arc<HandlerRegistry>,
    pub subjects: Arc<dyn SubjectMediaStore>,
}

/// Backends handed to [`MediaApp::assemble`]
pub struct AppParts<S> {
    pub store: Arc<S>,
    pub transfer: Arc<dyn TransferClient>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub channel: Arc<dyn EventChannel>,
    pub records: Arc<dyn MediaRecordStore>,
    pub subjects: Arc<dyn SubjectMediaStore>,
}

/// In-memory backends kept by tests and local runs for inspection
#[derive(Clone)]
pub struct MemoryHandles {
    pub store: Arc<MemoryObjectStore>,
    pub channel: Arc<MemoryChannel>,
}

impl MediaApp {
    pub fn assemble<S>(settings: MediaSettings, parts: AppParts<S>) -> Result<Self>
    where
        S: MediaObjectStore + 'static,
    {
        let coordinator = Arc::new(DefaultUploadCoordinator::new(parts.store, settings.blob_config()));
        let executor = PartTransferExecutor::new(parts.transfer, settings.max_in_flight, settings.request_timeout);
        let keys = Arc::new(DefaultKeyStrategy::new(settings.tenant_prefix.clone()));

        let media = Arc::new(MediaService::new(
            settings.bucket.clone(),
            coordinator,
            keys,
            parts.records,
            executor,
        ));

        let workflow = Arc::new(DerivativeWorkflow::new(
            media.clone(),
            parts.subjects.clone(),
            parts.fetcher,
            Arc::new(BlurTransform::new(settings.blur_sigma, settings.blur_quality)),
            parts.channel,
            settings.notify_topic.clone(),
        ));

        let mut handlers = HandlerRegistry::new();
        handlers.register(workflow.clone())?;

        Ok(Self {
            settings,
            media,
            workflow,
            handlers: Arc::new(handlers),
            subjects: parts.subjects,
        })
    }

    /// S3 storage, HTTP transfers and push publishing.
    pub async fn connect(settings: MediaSettings) -> Result<Self> {
        let registry = EntityRegistry::standard();
        let http = reqwest::Client::builder().build()?;

        let store = Arc::new(S3Store::connect(settings.s3.clone()).await);
        let channel = settings
            .event_endpoints
            .iter()
            .fold(
                HttpPushChannel::new(http.clone()).with_timeout(settings.request_timeout),
                |channel, (topic, url)| channel.with_endpoint(topic.clone(), url.clone()),
            );

        info!(bucket = %settings.bucket, region = %settings.s3.region, "connecting media backends");
        let parts = AppParts {
            store,
            transfer: Arc::new(HttpTransferClient::new(http.clone())),
            fetcher: Arc::new(HttpFetcher::new(http, settings.request_timeout)),
            channel: Arc::new(channel),
            records: Arc::new(MemoryMediaRecordStore::new(&registry)?),
            subjects: Arc::new(MemorySubjectMediaStore::new(&registry)?),
        };
        Self::assemble(settings, parts)
    }

    /// Everything in process. The handlers are subscribed to the events topic
    /// so `deliver_pending` drives the workflow.
    pub fn in_memory(settings: MediaSettings, store: MemoryObjectStore) -> Result<(Self, MemoryHandles)> {
        let registry = EntityRegistry::standard();
        let store = Arc::new(store);
        let channel = Arc::new(MemoryChannel::new());

        let parts = AppParts {
            store: store.clone(),
            transfer: Arc::new(MemoryTransferClient::new(store.clone())),
            fetcher: Arc::new(MemoryFetcher::new(store.clone())),
            channel: channel.clone(),
            records: Arc::new(MemoryMediaRecordStore::new(&registry)?),
            subjects: Arc::new(MemorySubjectMediaStore::new(&registry)?),
        };
        let app = Self::assemble(settings, parts)?;
        channel.subscribe(app.settings.events_topic.clone(), app.handlers.clone());

        Ok((app, MemoryHandles { store, channel }))
    }
}

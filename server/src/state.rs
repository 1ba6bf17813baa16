use std::sync::Arc;

use crate::config::{Config, PushConfig};
use crate::gateway::{
    BlobStore, HttpPushSender, NoopPushSender, PaymentGateway, PushSender, UpstreamError,
    WebhookVerifier,
};
use crate::jobs::JobQueue;
use crate::services::{
    BookingService, BookingSettings, CancellationLedger, EventNotifier, KeyedLocks,
    NotificationPipeline, NotificationSettings, PaymentWebhooks, TicketIssuer,
};
use crate::store::{BookingStore, Directory, NotificationStore};

/// External services the API talks to.
pub struct Collaborators {
    pub payments: Arc<dyn PaymentGateway>,
    pub blobs: Arc<dyn BlobStore>,
    pub push: Arc<dyn PushSender>,
}

/// The slice of [`Config`] the services need.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub booking: BookingSettings,
    pub notifications: NotificationSettings,
    pub webhook_secret: String,
    pub max_job_attempts: i32,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            booking: config.booking.clone(),
            notifications: config.notifications.clone(),
            webhook_secret: config.payments.webhook_secret.clone(),
            max_job_attempts: config.worker.retry.max_attempts,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
    pub cancellations: Arc<CancellationLedger>,
    pub webhooks: Arc<PaymentWebhooks>,
    pub notifications: Arc<NotificationPipeline>,
    pub notifier: Arc<EventNotifier>,
    pub jobs: Arc<dyn JobQueue>,
}

impl AppState {
    /// Wires every service over one store that backs all persistence traits.
    pub fn new<S>(store: Arc<S>, collaborators: Collaborators, settings: ServiceSettings) -> Self
    where
        S: BookingStore + NotificationStore + Directory + JobQueue + 'static,
    {
        let bookings: Arc<dyn BookingStore> = store.clone();
        let directory: Arc<dyn Directory> = store.clone();
        let jobs: Arc<dyn JobQueue> = store.clone();
        let notification_store: Arc<dyn NotificationStore> = store;

        // Confirmation and cancellation of one booking share a lock.
        let locks = Arc::new(KeyedLocks::new());

        let booking_service = Arc::new(BookingService::new(
            bookings.clone(),
            directory.clone(),
            collaborators.payments,
            TicketIssuer::new(collaborators.blobs),
            locks.clone(),
            settings.booking.clone(),
        ));
        let cancellations = Arc::new(CancellationLedger::new(
            bookings,
            locks,
            settings.booking.cancellation_fee_rule.clone(),
        ));
        let webhooks = Arc::new(PaymentWebhooks::new(
            WebhookVerifier::new(settings.webhook_secret),
            booking_service.clone(),
        ));
        let notifications = Arc::new(NotificationPipeline::new(
            notification_store,
            directory.clone(),
            jobs.clone(),
            collaborators.push,
            settings.max_job_attempts,
        ));
        let notifier = Arc::new(EventNotifier::new(
            notifications.clone(),
            directory,
            settings.notifications,
        ));

        Self {
            bookings: booking_service,
            cancellations,
            webhooks,
            notifications,
            notifier,
            jobs,
        }
    }
}

/// HTTP push when an endpoint is configured, otherwise a sender that only logs.
pub fn push_sender(config: &PushConfig) -> Result<Arc<dyn PushSender>, UpstreamError> {
    match &config.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Push delivery enabled");
            Ok(Arc::new(HttpPushSender::new(endpoint.clone(), config.timeout)?))
        }
        None => {
            tracing::warn!("PUSH_ENDPOINT not set, push messages will be dropped");
            Ok(Arc::new(NoopPushSender))
        }
    }
}

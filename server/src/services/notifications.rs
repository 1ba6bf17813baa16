//! Broadcast fan-out, direct notifications and the event-driven triggers
//! that feed them.
//!
//! A broadcast is stored once as a [`MasterNotification`] and a
//! `distribute-to-users` job is queued. The worker expands it into one
//! [`UserNotification`] per user active at that moment, then queues a
//! `deliver-broadcast` job that pushes each record still pending.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{PushMessage, PushSender};
use crate::jobs::{JobError, JobHandler, JobQueue};
use crate::models::{
    BroadcastType, DeliveryStatus, Event, InboxEntry, Job, JobKind, MasterNotification,
    NewMasterNotification, NewNotification, Notification, NotificationKind, NotificationSource,
    Page, Priority, UserNotification,
};
use crate::store::{Directory, NotificationStore, StoreError};
use crate::utils::{AppError, AppResult};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Which notification triggers are switched on, and how deep links look.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub reminder_enabled: bool,
    pub new_event_enabled: bool,
    pub event_update_enabled: bool,
    pub deep_link_scheme: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            reminder_enabled: true,
            new_event_enabled: true,
            event_update_enabled: true,
            deep_link_scheme: "funora".to_string(),
        }
    }
}

impl NotificationSettings {
    pub fn event_deep_link(&self, event_id: Uuid) -> String {
        format!("{}://event/{}", self.deep_link_scheme, event_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub notification: MasterNotification,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub sent: u64,
    pub failed: u64,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageRequest {
    fn resolve(self) -> AppResult<(u32, u32)> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 {
            return Err(AppError::ValidationError(
                "page starts at 1".to_string(),
            ));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok((page, limit))
    }
}

/// How long a claimed record may sit in `sending` before another delivery
/// run takes it over.
const DELIVERY_LEASE_SECS: i64 = 600;

fn delivery_lease() -> chrono::Duration {
    chrono::Duration::seconds(DELIVERY_LEASE_SECS)
}

fn retryable(err: StoreError) -> JobError {
    JobError::Retryable(err.to_string())
}

pub struct NotificationPipeline {
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn Directory>,
    queue: Arc<dyn JobQueue>,
    push: Arc<dyn PushSender>,
    max_attempts: i32,
}

impl NotificationPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        directory: Arc<dyn Directory>,
        queue: Arc<dyn JobQueue>,
        push: Arc<dyn PushSender>,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            directory,
            queue,
            push,
            max_attempts,
        }
    }

    /// Stores the broadcast and queues its fan-out. Returns as soon as the job
    /// is queued; delivery happens in the worker.
    pub async fn broadcast(&self, new: NewMasterNotification) -> AppResult<BroadcastReceipt> {
        if new.title.trim().is_empty() || new.message.trim().is_empty() {
            return Err(AppError::ValidationError(
                "title and message are required".to_string(),
            ));
        }

        let now = Utc::now();
        let master = self.store.insert_master(new.into_master(now)).await?;
        let job = self
            .queue
            .enqueue(Job::new(
                JobKind::DistributeToUsers {
                    master_notification_id: master.id,
                },
                self.max_attempts,
                now,
            ))
            .await?;

        info!(notification_id = %master.id, job_id = %job.id, kind = master.kind.as_str(), "Broadcast queued");
        Ok(BroadcastReceipt {
            notification: master,
            job_id: job.id,
        })
    }

    /// Creates one pending record per currently active user. Safe to re-run:
    /// users who already have a record are skipped.
    pub async fn distribute(&self, master_notification_id: Uuid) -> Result<u64, JobError> {
        let master = self
            .store
            .get_master(master_notification_id)
            .await
            .map_err(retryable)?
            .ok_or_else(|| {
                JobError::Fatal(format!(
                    "master notification {} not found",
                    master_notification_id
                ))
            })?;

        let now = Utc::now();
        let recipients = self.directory.active_user_ids().await.map_err(retryable)?;
        let records: Vec<UserNotification> = recipients
            .iter()
            .map(|user_id| UserNotification::pending(*user_id, master.id, now))
            .collect();

        let inserted = self
            .store
            .insert_user_notifications(records)
            .await
            .map_err(retryable)?;

        info!(
            notification_id = %master.id,
            recipients = recipients.len(),
            inserted,
            "Distributed broadcast"
        );

        self.queue
            .enqueue(Job::new(
                JobKind::DeliverBroadcast {
                    master_notification_id: master.id,
                },
                self.max_attempts,
                now,
            ))
            .await
            .map_err(retryable)?;

        Ok(inserted)
    }

    /// Claims every record of a broadcast that is still pending and pushes
    /// it. A push failure marks that record `failed`; it is not retried.
    pub async fn deliver_broadcast(
        &self,
        master_notification_id: Uuid,
    ) -> Result<DeliveryReport, JobError> {
        let master = self
            .store
            .get_master(master_notification_id)
            .await
            .map_err(retryable)?
            .ok_or_else(|| {
                JobError::Fatal(format!(
                    "master notification {} not found",
                    master_notification_id
                ))
            })?;

        let now = Utc::now();
        let claimed = self
            .store
            .claim_user_notifications(master.id, now, now - delivery_lease())
            .await
            .map_err(retryable)?;

        let mut report = DeliveryReport::default();
        for record in claimed {
            let message = PushMessage {
                user_id: record.user_id,
                title: master.title.clone(),
                body: master.message.clone(),
                image_url: master.image_url.clone(),
                deep_link: master.deep_link.clone(),
                data: json!({
                    "notificationId": master.id,
                    "userNotificationId": record.id,
                    "type": master.kind.as_str(),
                    "eventId": master.event_id,
                }),
            };

            let status = match self.push.send(&message).await {
                Ok(()) => {
                    report.sent += 1;
                    DeliveryStatus::Sent
                }
                Err(e) => {
                    warn!(user_notification_id = %record.id, error = %e, "Push delivery failed");
                    report.failed += 1;
                    DeliveryStatus::Failed
                }
            };
            self.store
                .set_delivery_status(record.id, status)
                .await
                .map_err(retryable)?;
        }

        info!(
            notification_id = %master.id,
            sent = report.sent,
            failed = report.failed,
            "Delivered broadcast"
        );
        Ok(report)
    }

    /// Creates a single-recipient notification and pushes it right away. The
    /// record is kept even when the push fails; its status says `failed` then.
    pub async fn send(&self, new: NewNotification) -> AppResult<Notification> {
        if new.title.trim().is_empty() || new.body.trim().is_empty() {
            return Err(AppError::ValidationError(
                "title and body are required".to_string(),
            ));
        }
        if self.directory.user(new.user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", new.user_id)));
        }

        let notification = self
            .store
            .insert_notification(new.into_pending(Utc::now()))
            .await?;

        let message = PushMessage {
            user_id: notification.user_id,
            title: notification.title.clone(),
            body: notification.body.clone(),
            image_url: notification.image_url.clone(),
            deep_link: notification.deep_link.clone(),
            data: json!({
                "notificationId": notification.id,
                "type": notification.kind.as_str(),
                "eventId": notification.event_id,
            }),
        };

        let delivered = match self.push.send(&message).await {
            Ok(()) => {
                self.store
                    .record_notification_delivery(
                        notification.id,
                        DeliveryStatus::Sent,
                        Some(Utc::now()),
                    )
                    .await?
            }
            Err(e) => {
                warn!(notification_id = %notification.id, error = %e, "Direct notification push failed");
                self.store
                    .record_notification_delivery(notification.id, DeliveryStatus::Failed, None)
                    .await?
            }
        };

        info!(
            notification_id = %delivered.id,
            user_id = %delivered.user_id,
            status = delivered.status.as_str(),
            "Direct notification recorded"
        );
        Ok(delivered)
    }

    /// Marks one inbox record or direct notification read. Repeating the call
    /// changes nothing.
    pub async fn mark_read(&self, id: Uuid) -> AppResult<()> {
        let matched = self.store.mark_read(&[id], Utc::now()).await?;
        if matched == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }

    /// Returns how many of `ids` matched a record.
    pub async fn mark_all_read(&self, ids: &[Uuid]) -> AppResult<u64> {
        if ids.is_empty() {
            return Err(AppError::ValidationError(
                "notificationIds must not be empty".to_string(),
            ));
        }
        Ok(self.store.mark_read(ids, Utc::now()).await?)
    }

    pub async fn inbox(&self, user_id: Uuid, request: PageRequest) -> AppResult<Page<InboxEntry>> {
        let (page, limit) = request.resolve()?;
        let offset = u64::from(page - 1) * u64::from(limit);
        let (total, items) = self.store.inbox(user_id, offset, u64::from(limit)).await?;
        Ok(Page {
            total,
            page,
            limit,
            items,
        })
    }

    pub async fn user_notifications(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> AppResult<Page<Notification>> {
        let (page, limit) = request.resolve()?;
        let offset = u64::from(page - 1) * u64::from(limit);
        let (total, items) = self
            .store
            .notifications_for_user(user_id, offset, u64::from(limit))
            .await?;
        Ok(Page {
            total,
            page,
            limit,
            items,
        })
    }
}

#[async_trait]
impl JobHandler for NotificationPipeline {
    async fn handle(&self, kind: &JobKind) -> Result<(), JobError> {
        match kind {
            JobKind::DistributeToUsers {
                master_notification_id,
            } => self.distribute(*master_notification_id).await.map(|_| ()),
            JobKind::DeliverBroadcast {
                master_notification_id,
            } => self
                .deliver_broadcast(*master_notification_id)
                .await
                .map(|_| ()),
        }
    }
}

/// Result of an event trigger.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerOutcome {
    #[serde(rename_all = "camelCase")]
    Queued {
        notification_id: Uuid,
        job_id: Uuid,
    },
    Sent {
        notification: Box<Notification>,
    },
    Skipped {
        reason: String,
    },
}

impl TriggerOutcome {
    fn skipped(trigger: &str) -> Self {
        TriggerOutcome::Skipped {
            reason: format!("{} notifications are disabled", trigger),
        }
    }
}

/// Fields of an event whose change is worth telling users about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventField {
    Description,
    DateFrom,
    DateTo,
    TimeFrom,
    TimeTo,
    Venue,
    Guidance,
    TicketPrice,
}

/// One message per distinct kind of change, in the order given.
pub fn update_messages(event_title: &str, changed: &[EventField]) -> Vec<String> {
    let mut messages: Vec<String> = Vec::new();
    for field in changed {
        let message = match field {
            EventField::Description => "Exciting updates to the event details!".to_string(),
            EventField::DateFrom | EventField::DateTo => format!(
                "Dates of \"{}\" have been updated. Check the new schedule!",
                event_title
            ),
            EventField::TimeFrom | EventField::TimeTo => {
                "The event timing has changed. Don't miss it!".to_string()
            }
            EventField::Venue => format!(
                "Venue changed! Find \"{}\" at the new location.",
                event_title
            ),
            EventField::Guidance => {
                format!("New visitor guidance added for \"{}\".", event_title)
            }
            EventField::TicketPrice => "Ticket price updated! Secure your spot now.".to_string(),
        };
        if !messages.contains(&message) {
            messages.push(message);
        }
    }
    messages
}

/// Turns event lifecycle triggers into notifications, gated by
/// [`NotificationSettings`].
pub struct EventNotifier {
    pipeline: Arc<NotificationPipeline>,
    directory: Arc<dyn Directory>,
    settings: NotificationSettings,
}

impl EventNotifier {
    pub fn new(
        pipeline: Arc<NotificationPipeline>,
        directory: Arc<dyn Directory>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            pipeline,
            directory,
            settings,
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    async fn load_event(&self, event_id: Uuid) -> AppResult<Event> {
        self.directory
            .active_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))
    }

    fn event_metadata(event: &Event) -> serde_json::Value {
        json!({
            "venue": event.venue,
            "startDate": event.date_from,
            "endDate": event.date_to,
        })
    }

    async fn broadcast_for(
        &self,
        event: &Event,
        kind: BroadcastType,
        message: String,
    ) -> AppResult<TriggerOutcome> {
        let receipt = self
            .pipeline
            .broadcast(NewMasterNotification {
                title: event.title.clone(),
                message,
                kind,
                event_id: Some(event.id),
                image_url: event.banner_url.clone(),
                deep_link: Some(self.settings.event_deep_link(event.id)),
                metadata: Self::event_metadata(event),
            })
            .await?;

        Ok(TriggerOutcome::Queued {
            notification_id: receipt.notification.id,
            job_id: receipt.job_id,
        })
    }

    pub async fn event_created(&self, event_id: Uuid) -> AppResult<TriggerOutcome> {
        if !self.settings.new_event_enabled {
            return Ok(TriggerOutcome::skipped("new event"));
        }

        let event = self.load_event(event_id).await?;
        let message = format!(
            "Just announced: \"{}\" is coming soon! Don't miss out, check it out now!",
            event.title
        );
        self.broadcast_for(&event, BroadcastType::EventCreate, message)
            .await
    }

    pub async fn event_updated(
        &self,
        event_id: Uuid,
        changed: &[EventField],
    ) -> AppResult<TriggerOutcome> {
        if !self.settings.event_update_enabled {
            return Ok(TriggerOutcome::skipped("event update"));
        }

        let event = self.load_event(event_id).await?;
        let messages = update_messages(&event.title, changed);
        if messages.is_empty() {
            return Ok(TriggerOutcome::Skipped {
                reason: "no important field changed".to_string(),
            });
        }

        self.broadcast_for(&event, BroadcastType::EventUpdate, messages.join(" "))
            .await
    }

    /// Sends a high priority reminder about `event_id` straight to one user.
    pub async fn remind(&self, user_id: Uuid, event_id: Uuid) -> AppResult<TriggerOutcome> {
        if !self.settings.reminder_enabled {
            return Ok(TriggerOutcome::skipped("reminder"));
        }

        let event = self.load_event(event_id).await?;
        let mut metadata = Self::event_metadata(&event);
        metadata["eventTimeFrom"] = json!(event.time_from);

        let notification = self
            .pipeline
            .send(NewNotification {
                user_id,
                event_id: Some(event.id),
                title: event.title.clone(),
                body: format!(
                    "Get excited! \"{}\" is happening soon, and it's going to be unforgettable!",
                    event.title
                ),
                kind: NotificationKind::Reminder,
                priority: Priority::High,
                image_url: event.banner_url.clone(),
                deep_link: Some(self.settings.event_deep_link(event.id)),
                source: NotificationSource::System,
                metadata,
            })
            .await?;

        Ok(TriggerOutcome::Sent {
            notification: Box::new(notification),
        })
    }
}

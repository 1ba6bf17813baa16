use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NewNotification;
use crate::services::notifications::{EventField, PageRequest, TriggerOutcome};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::{AppJson, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPageRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub page: PageRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub notification_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadRequest {
    #[serde(default)]
    pub notification_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
struct MarkedCount {
    updated: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRef {
    pub event_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdatedRequest {
    pub event_id: Uuid,
    #[serde(default)]
    pub changed_fields: Vec<EventField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemindRequest {
    pub user_id: Uuid,
    pub event_id: Uuid,
}

fn trigger_message(outcome: &TriggerOutcome) -> &'static str {
    match outcome {
        TriggerOutcome::Queued { .. } => "Notification queued",
        TriggerOutcome::Sent { .. } => "Notification sent",
        TriggerOutcome::Skipped { .. } => "Notification skipped",
    }
}

pub async fn send_notification(
    State(state): State<AppState>,
    AppJson(request): AppJson<NewNotification>,
) -> AppResult<Response> {
    let notification = state.notifications.send(request).await?;
    Ok(created(notification, "Notification created"))
}

pub async fn fetch_notifications(
    State(state): State<AppState>,
    AppJson(request): AppJson<UserPageRequest>,
) -> AppResult<Response> {
    let page = state
        .notifications
        .user_notifications(request.user_id, request.page)
        .await?;
    Ok(success(page, "Notifications fetched"))
}

pub async fn inbox(
    State(state): State<AppState>,
    AppJson(request): AppJson<UserPageRequest>,
) -> AppResult<Response> {
    let page = state.notifications.inbox(request.user_id, request.page).await?;
    Ok(success(page, "Inbox fetched"))
}

pub async fn mark_read(
    State(state): State<AppState>,
    AppJson(request): AppJson<MarkReadRequest>,
) -> AppResult<Response> {
    state.notifications.mark_read(request.notification_id).await?;
    Ok(empty_success("Notification marked as read"))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    AppJson(request): AppJson<MarkAllReadRequest>,
) -> AppResult<Response> {
    let updated = state.notifications.mark_all_read(&request.notification_ids).await?;
    Ok(success(MarkedCount { updated }, "Notifications marked as read"))
}

pub async fn event_created(
    State(state): State<AppState>,
    AppJson(request): AppJson<EventRef>,
) -> AppResult<Response> {
    let outcome = state.notifier.event_created(request.event_id).await?;
    let message = trigger_message(&outcome);
    Ok(success(outcome, message))
}

pub async fn event_updated(
    State(state): State<AppState>,
    AppJson(request): AppJson<EventUpdatedRequest>,
) -> AppResult<Response> {
    let outcome = state
        .notifier
        .event_updated(request.event_id, &request.changed_fields)
        .await?;
    let message = trigger_message(&outcome);
    Ok(success(outcome, message))
}

pub async fn remind(
    State(state): State<AppState>,
    AppJson(request): AppJson<RemindRequest>,
) -> AppResult<Response> {
    let outcome = state
        .notifier
        .remind(request.user_id, request.event_id)
        .await?;
    let message = trigger_message(&outcome);
    Ok(success(outcome, message))
}

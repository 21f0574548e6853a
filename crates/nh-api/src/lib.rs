//! HTTP control plane: notification submission and status, queue admin,
//! analytics, per-channel direct send/verify, and the ambient health/metrics/
//! OpenAPI surface every binary in this family carries.
//!
//! `AppState` carries the store, queue, dispatcher, and channel adapters; the
//! router is a plain `axum::Router` with a `utoipa`-driven Swagger UI layered
//! on top, covering only this system's actual route list.

pub mod error;
pub mod model;
pub mod state;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nh_common::NewNotification;
use nh_queue::QueueJob;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;
pub use state::AppState;

use model::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        send_notification,
        get_notification_status,
        list_user_notifications,
        retry_notification,
        queue_stats,
        queue_pause,
        queue_resume,
        queue_clear_failed,
        queue_retry_failed,
        queue_health,
        analytics_summary,
        analytics_errors,
        analytics_logs,
        health_handler,
        readiness_handler,
    ),
    components(schemas(
        SendNotificationRequest,
        ChannelTarget,
        SendNotificationResponse,
        NotificationStatusResponse,
        ChannelStatus,
        PageQuery,
        LimitQuery,
        RetryRequest,
        RetryResponse,
        RetryFailedResponse,
        ClearFailedResponse,
        LogEntry,
        SimpleHealthResponse,
        ReadinessResponse,
        AnalyticsSummaryResponse,
        StatusCount,
        ChannelCount,
        HourlyCount,
        HourlySentFailed,
    )),
    tags(
        (name = "notifications", description = "Submission and status lookup"),
        (name = "queue", description = "Broker admin operations"),
        (name = "analytics", description = "Read-side reporting"),
        (name = "health", description = "Liveness and readiness"),
    )
)]
struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/notifications/send", post(send_notification))
        .route("/api/notifications/:id/status", get(get_notification_status))
        .route("/api/notifications/user/:user_id", get(list_user_notifications))
        .route("/api/notifications/:id/retry", post(retry_notification))
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/pause", post(queue_pause))
        .route("/api/queue/resume", post(queue_resume))
        .route("/api/queue/clear-failed", post(queue_clear_failed))
        .route("/api/queue/retry-failed", post(queue_retry_failed))
        .route("/api/queue/health", get(queue_health))
        .route("/api/analytics", get(analytics_summary))
        .route("/api/analytics/errors", get(analytics_errors))
        .route("/api/analytics/logs", get(analytics_logs))
        .route("/api/email/send", post(email_send))
        .route("/api/email/verify", get(email_verify))
        .route("/api/sms/send", post(sms_send))
        .route("/api/sms/verify", get(sms_verify))
        .route("/api/push/send-multicast", post(push_send_multicast))
        .route("/api/push/send-topic", post(push_send_topic))
        .route("/api/push/subscribe-topic", post(push_subscribe_topic))
        .route("/api/push/unsubscribe-topic", post(push_unsubscribe_topic))
        .route("/api/push/verify", get(push_verify))
        .route("/api/slack/send", post(slack_send))
        .route("/api/slack/verify", get(slack_verify))
        .route("/api/telegram/send", post(telegram_send))
        .route("/api/telegram/verify", get(telegram_verify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

// ===========================================================================
// Notifications
// ===========================================================================

/// Submit a notification for delivery over one or more channels (§6). Creates
/// one row per channel and publishes each onto the queue; the response's id is
/// the first row created (fan-out scenario, §8 scenario 6).
#[utoipa::path(
    post,
    path = "/api/notifications/send",
    tag = "notifications",
    request_body = SendNotificationRequest,
    responses((status = 201, description = "Notification queued", body = SendNotificationResponse))
)]
async fn send_notification(
    State(state): State<AppState>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<SendNotificationResponse>), ApiError> {
    if req.channels.is_empty() {
        return Err(ApiError::Validation("channels must not be empty".to_string()));
    }
    for target in &req.channels {
        if target.recipient.trim().is_empty() {
            return Err(ApiError::Validation(format!("recipient required for channel {}", target.channel)));
        }
    }

    let priority = req.priority.unwrap_or_default();
    let scheduled_at = req.scheduled_at.unwrap_or_else(chrono::Utc::now);

    let mut first_id = None;
    for target in &req.channels {
        let max_retries = nh_dispatcher::policy_for(target.channel).max_retries;
        let notification = state
            .store
            .create(NewNotification {
                user_id: req.user_id,
                template_id: None,
                channel: target.channel,
                recipient: target.recipient.clone(),
                subject: req.subject.clone(),
                content: req.message.clone(),
                priority,
                max_retries,
                scheduled_at,
            })
            .await?;

        let delay_ms = (scheduled_at - chrono::Utc::now()).num_milliseconds();
        let delay_ms = if delay_ms > 0 { Some(delay_ms as u64) } else { None };

        state
            .queue
            .publish(QueueJob { notification_id: notification.id, channel: notification.channel, priority, delay_ms })
            .await?;
        state
            .store
            .update_status(notification.id, nh_common::NotificationStatus::Queued, None)
            .await?;

        first_id.get_or_insert(notification.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(SendNotificationResponse {
            success: true,
            notification_id: first_id.expect("at least one channel was validated above"),
            message: "notification queued".to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/notifications/{id}/status",
    tag = "notifications",
    responses((status = 200, body = NotificationStatusResponse), (status = 404))
)]
async fn get_notification_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NotificationStatusResponse>, ApiError> {
    let notification = state.store.find_by_id(id).await?.ok_or_else(|| ApiError::NotFound(format!("notification {id}")))?;
    Ok(Json(NotificationStatusResponse::from(&notification)))
}

#[utoipa::path(
    get,
    path = "/api/notifications/user/{user_id}",
    tag = "notifications",
    responses((status = 200, body = Vec<NotificationStatusResponse>))
)]
async fn list_user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<NotificationStatusResponse>>, ApiError> {
    let rows = state.store.list_by_user(user_id, page.page, page.limit).await?;
    Ok(Json(rows.iter().map(NotificationStatusResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{id}/retry",
    tag = "notifications",
    request_body = RetryRequest,
    responses((status = 200, body = RetryResponse))
)]
async fn retry_notification(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<RetryRequest>>,
) -> Result<Json<RetryResponse>, ApiError> {
    let reset_retry_count = body.map(|Json(r)| r.reset_retry_count).unwrap_or(false);
    let success = state.dispatcher.admin.retry_one(id, reset_retry_count).await?;
    Ok(Json(RetryResponse { success }))
}

// ===========================================================================
// Queue admin
// ===========================================================================

#[utoipa::path(get, path = "/api/queue/stats", tag = "queue", responses((status = 200, body = nh_common::QueueStats)))]
async fn queue_stats(State(state): State<AppState>) -> Json<nh_common::QueueStats> {
    Json(state.dispatcher.admin.queue_stats().await)
}

#[utoipa::path(post, path = "/api/queue/pause", tag = "queue", responses((status = 200)))]
async fn queue_pause(State(state): State<AppState>) -> StatusCode {
    state.dispatcher.admin.pause().await;
    StatusCode::OK
}

#[utoipa::path(post, path = "/api/queue/resume", tag = "queue", responses((status = 200)))]
async fn queue_resume(State(state): State<AppState>) -> StatusCode {
    state.dispatcher.admin.resume().await;
    StatusCode::OK
}

#[utoipa::path(
    post,
    path = "/api/queue/clear-failed",
    tag = "queue",
    responses((status = 200, body = ClearFailedResponse))
)]
async fn queue_clear_failed(State(state): State<AppState>) -> Result<Json<ClearFailedResponse>, ApiError> {
    let cleared = state.dispatcher.admin.clear_failed().await?;
    Ok(Json(ClearFailedResponse { cleared }))
}

#[utoipa::path(
    post,
    path = "/api/queue/retry-failed",
    tag = "queue",
    responses((status = 200, body = RetryFailedResponse))
)]
async fn queue_retry_failed(State(state): State<AppState>) -> Result<Json<RetryFailedResponse>, ApiError> {
    let requeued = state.dispatcher.admin.retry_failed().await?;
    Ok(Json(RetryFailedResponse { requeued }))
}

#[utoipa::path(get, path = "/api/queue/health", tag = "queue", responses((status = 200, body = nh_common::HealthReport)))]
async fn queue_health(State(state): State<AppState>) -> Json<nh_common::HealthReport> {
    Json(state.dispatcher.admin.system_health().await)
}

// ===========================================================================
// Analytics
// ===========================================================================

#[utoipa::path(get, path = "/api/analytics", tag = "analytics", responses((status = 200, body = AnalyticsSummaryResponse)))]
async fn analytics_summary(State(state): State<AppState>) -> Result<Json<AnalyticsSummaryResponse>, ApiError> {
    let summary = state.dispatcher.analytics.summary().await?;
    Ok(Json(AnalyticsSummaryResponse::from(summary)))
}

#[utoipa::path(get, path = "/api/analytics/errors", tag = "analytics", responses((status = 200, body = Vec<LogEntry>)))]
async fn analytics_errors(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let logs = state.dispatcher.analytics.error_logs(query.limit).await?;
    Ok(Json(logs.into_iter().map(LogEntry::from).collect()))
}

#[utoipa::path(get, path = "/api/analytics/logs", tag = "analytics", responses((status = 200, body = Vec<LogEntry>)))]
async fn analytics_logs(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let logs = state.dispatcher.analytics.recent_logs(query.limit).await?;
    Ok(Json(logs.into_iter().map(LogEntry::from).collect()))
}

// ===========================================================================
// Per-channel direct endpoints — bypass the queue, invoke adapters synchronously (§6)
// ===========================================================================

async fn email_send(State(state): State<AppState>, Json(req): Json<DirectSendRequest>) -> Result<Json<DirectSendResponse>, ApiError> {
    direct_send(state.email.as_ref(), &state, req).await
}

async fn email_verify(State(state): State<AppState>) -> Response {
    direct_verify(state.email.as_ref()).await
}

async fn sms_send(State(state): State<AppState>, Json(req): Json<DirectSendRequest>) -> Result<Json<DirectSendResponse>, ApiError> {
    direct_send(state.sms.as_ref(), &state, req).await
}

async fn sms_verify(State(state): State<AppState>) -> Response {
    direct_verify(state.sms.as_ref()).await
}

async fn slack_send(State(state): State<AppState>, Json(req): Json<DirectSendRequest>) -> Result<Json<DirectSendResponse>, ApiError> {
    direct_send(state.slack.as_ref(), &state, req).await
}

async fn slack_verify(State(state): State<AppState>) -> Response {
    direct_verify(state.slack.as_ref()).await
}

async fn telegram_send(State(state): State<AppState>, Json(req): Json<DirectSendRequest>) -> Result<Json<DirectSendResponse>, ApiError> {
    direct_send(state.telegram.as_ref(), &state, req).await
}

async fn telegram_verify(State(state): State<AppState>) -> Response {
    direct_verify(state.telegram.as_ref()).await
}

/// Builds a throwaway `Notification` shell so direct-send can reuse
/// `ChannelAdapter::send` without a backing row — these calls are
/// fire-and-forget and never touch the store (§6).
fn adhoc_notification(channel: nh_common::Channel, recipient: &str, subject: Option<String>, content: String) -> nh_common::Notification {
    let now = chrono::Utc::now();
    nh_common::Notification {
        id: 0,
        user_id: None,
        template_id: None,
        channel,
        recipient: recipient.to_string(),
        subject,
        content,
        status: nh_common::NotificationStatus::Pending,
        priority: nh_common::Priority::Normal,
        retry_count: 0,
        max_retries: 0,
        scheduled_at: now,
        last_processed_at: None,
        sent_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

async fn direct_send(
    adapter: &dyn nh_channels::ChannelAdapter,
    _state: &AppState,
    req: DirectSendRequest,
) -> Result<Json<DirectSendResponse>, ApiError> {
    let notification = adhoc_notification(adapter.channel(), &req.recipient, req.subject, req.message);
    let result = adapter.send(&notification, &req.recipient).await?;
    Ok(Json(DirectSendResponse { success: true, message_id: result.message_id }))
}

async fn direct_verify(adapter: &dyn nh_channels::ChannelAdapter) -> Response {
    match adapter.verify().await {
        Ok(()) => (StatusCode::OK, Json(adapter.status())).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(adapter.status())).into_response(),
    }
}

async fn push_send_multicast(
    State(state): State<AppState>,
    Json(req): Json<PushMulticastRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = req.subject.unwrap_or_default();
    let body = state.push.send_multicast(&req.tokens, &title, &req.message).await?;
    Ok(Json(body))
}

async fn push_send_topic(
    State(state): State<AppState>,
    Json(req): Json<PushTopicRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = req.subject.unwrap_or_default();
    let body = state.push.send_topic(&req.topic, &title, &req.message).await?;
    Ok(Json(body))
}

async fn push_subscribe_topic(State(state): State<AppState>, Json(req): Json<PushTopicSubscriptionRequest>) -> Result<StatusCode, ApiError> {
    state.push.subscribe_topic(&req.tokens, &req.topic).await?;
    Ok(StatusCode::OK)
}

async fn push_unsubscribe_topic(State(state): State<AppState>, Json(req): Json<PushTopicSubscriptionRequest>) -> Result<StatusCode, ApiError> {
    state.push.unsubscribe_topic(&req.tokens, &req.topic).await?;
    Ok(StatusCode::OK)
}

async fn push_verify(State(state): State<AppState>) -> Response {
    direct_verify(state.push.as_ref()).await
}

// ===========================================================================
// Ambient endpoints
// ===========================================================================

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, body = SimpleHealthResponse)))]
async fn health_handler() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse { status: "UP".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses((status = 200, body = ReadinessResponse), (status = 503, body = ReadinessResponse))
)]
async fn readiness_handler(State(state): State<AppState>) -> Response {
    let health = state.dispatcher.admin.system_health().await;
    if health.healthy {
        (StatusCode::OK, Json(ReadinessResponse { status: "READY".to_string() })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(ReadinessResponse { status: "NOT_READY".to_string() })).into_response()
    }
}

/// Renders whatever the process-wide Prometheus recorder has captured.
/// The recorder itself is installed once at process start by the binary
/// (see `bin/nh-server`); this just reads the handle it produced.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adhoc_notification_carries_requested_channel_and_recipient() {
        let n = adhoc_notification(nh_common::Channel::Slack, "https://hooks.slack.test/x", None, "hi".to_string());
        assert_eq!(n.channel, nh_common::Channel::Slack);
        assert_eq!(n.recipient, "https://hooks.slack.test/x");
        assert_eq!(n.max_retries, 0);
    }
}

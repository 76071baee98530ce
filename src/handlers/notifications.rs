use crate::handlers::common::{AppPath, AppQuery, OptionalJson, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::notifications::{MarkAllReadInput, NotificationQuery},
    AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{get, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Creates the router for the caller's order notifications
pub fn notifications_routes() -> Router<AppState> {
    Router::new()
        .route("/tracking/notifications", get(list_notifications))
        .route("/tracking/notifications/unread-count", get(unread_count))
        .route("/tracking/notifications/read-all", put(mark_all_read))
        .route("/tracking/notifications/:id/read", put(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<NotificationQuery>,
) -> Result<Response, ServiceError> {
    let notifications = state
        .services
        .notifications
        .list_for_user(user.user_id, query)
        .await?;
    let unread_count = state
        .services
        .notifications
        .unread_count(user.user_id)
        .await?;

    Ok(success_response(json!({
        "notifications": notifications,
        "unread_count": unread_count,
    })))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let count = state
        .services
        .notifications
        .unread_count(user.user_id)
        .await?;
    Ok(success_response(json!({ "unread_count": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let notification = state
        .services
        .notifications
        .mark_read(user.user_id, id)
        .await?;
    Ok(success_response(json!({ "notification": notification })))
}

/// Body is optional; an `order_id` limits the update to one order
async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthUser,
    payload: OptionalJson<MarkAllReadInput>,
) -> Result<Response, ServiceError> {
    let input = payload.into_inner_or_default();
    let updated = state
        .services
        .notifications
        .mark_all_read(user.user_id, input.order_id)
        .await?;
    Ok(success_response(json!({ "updated": updated })))
}

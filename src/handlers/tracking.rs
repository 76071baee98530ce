use crate::handlers::common::{AppJson, AppPath, OptionalJson, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::tracking::{LocationUpdateInput, StartTrackingInput},
    AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Creates the router for delivery tracking endpoints
pub fn tracking_routes() -> Router<AppState> {
    Router::new()
        .route("/tracking/order/:id", get(get_tracking))
        .route("/tracking/order/:id/start", post(start_tracking))
        .route("/tracking/order/:id/location", put(update_location))
        .route("/tracking/order/:id/route", get(get_route))
        .route("/tracking/order/:id/history", get(get_history))
        .route("/tracking/order/:id/complete", post(complete_delivery))
        .route("/tracking/order/:id/cancel", post(cancel_tracking))
}

/// Courier leaves with the order; the destination must be geocodable
async fn start_tracking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
    payload: OptionalJson<StartTrackingInput>,
) -> Result<Response, ServiceError> {
    let input = payload.into_inner_or_default();
    let tracking = state
        .services
        .tracking
        .start_tracking(&user, order_id, input)
        .await?;
    Ok(success_response(json!({ "tracking": tracking })))
}

async fn update_location(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(payload): AppJson<LocationUpdateInput>,
) -> Result<Response, ServiceError> {
    let tracking = state
        .services
        .tracking
        .update_location(&user, order_id, payload)
        .await?;
    Ok(success_response(json!({ "tracking": tracking })))
}

/// `{has_tracking, tracking, order}` for the owner or staff
async fn get_tracking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let status = state
        .services
        .tracking
        .get_tracking(&user, order_id)
        .await?;
    Ok(success_response(json!(status)))
}

async fn get_route(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let route = state.services.tracking.get_route(&user, order_id).await?;
    Ok(success_response(json!({ "route": route })))
}

async fn get_history(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let history = state
        .services
        .tracking
        .get_history(&user, order_id)
        .await?;
    Ok(success_response(json!({ "history": history })))
}

async fn complete_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .tracking
        .complete_delivery(&user, order_id)
        .await?;
    Ok(success_response(json!({ "order": order })))
}

async fn cancel_tracking(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let tracking = state
        .services
        .tracking
        .cancel_tracking(&user, order_id)
        .await?;
    Ok(success_response(json!({ "tracking": tracking })))
}

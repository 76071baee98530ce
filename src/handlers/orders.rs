use crate::handlers::common::{AppJson, AppPath, AppQuery, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::orders::{OrderListQuery, UpdateOrderStatusInput},
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

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/status", put(update_order_status))
}

/// Own orders for clients, every order for staff
async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<OrderListQuery>,
) -> Result<Response, ServiceError> {
    let orders = state.services.orders.list_orders(&user, query).await?;
    Ok(success_response(json!({
        "count": orders.len(),
        "orders": orders,
    })))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(&user, id).await?;
    Ok(success_response(json!({ "order": order })))
}

async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateOrderStatusInput>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(&user, id, payload)
        .await?;
    Ok(success_response(json!({ "order": order })))
}

async fn delete_order(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.orders.delete_order(&user, id).await?;
    Ok(success_response(json!({
        "message": "Order deleted",
        "order_id": id,
    })))
}

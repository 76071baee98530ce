use crate::handlers::common::{OptionalJson, created_response};
use crate::{
    auth::AuthUser, errors::ServiceError, services::commerce::CreateOrderInput, AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::post,
    Router,
};
use serde_json::json;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout/create-order", post(create_order))
}

/// Turn the caller's cart into a pending order
async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    payload: OptionalJson<CreateOrderInput>,
) -> Result<Response, ServiceError> {
    let input = payload.into_inner_or_default();
    let created = state
        .services
        .checkout
        .create_order(user.user_id, input)
        .await?;

    let order_number = created.order.order_number.clone();
    Ok(created_response(json!({
        "order": created,
        "order_number": order_number,
    })))
}

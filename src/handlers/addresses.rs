use crate::handlers::common::{AppJson, AppPath, created_response, success_response};
use crate::{
    auth::AuthUser, errors::ServiceError, services::addresses::CreateAddressInput, AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{delete, get, put},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Creates the router for the caller's address book
pub fn addresses_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/:id/default", put(set_default_address))
        .route("/addresses/:id", delete(delete_address))
}

async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ServiceError> {
    let addresses = state.services.addresses.list(user.user_id).await?;
    Ok(success_response(json!({ "addresses": addresses })))
}

async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateAddressInput>,
) -> Result<Response, ServiceError> {
    let address = state
        .services
        .addresses
        .create(user.user_id, payload)
        .await?;
    Ok(created_response(json!({ "address": address })))
}

async fn set_default_address(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let address = state
        .services
        .addresses
        .set_default(user.user_id, id)
        .await?;
    Ok(success_response(json!({ "address": address })))
}

async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.addresses.delete(user.user_id, id).await?;
    Ok(success_response(json!({ "message": "Address deleted" })))
}

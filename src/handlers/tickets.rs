use crate::handlers::common::{AppJson, AppPath, AppQuery, created_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::tickets::{
        AddTicketMessageInput, CreateTicketInput, TicketListQuery, UpdateTicketInput,
    },
    AppState,
};
use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;
use uuid::Uuid;

/// Creates the router for support tickets
pub fn tickets_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/:id", get(get_ticket).put(update_ticket))
        .route("/tickets/:id/messages", post(add_ticket_message))
}

async fn list_tickets(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<TicketListQuery>,
) -> Result<Response, ServiceError> {
    let tickets = state.services.tickets.list_tickets(&user, query).await?;
    Ok(success_response(json!({
        "tickets": tickets,
        "count": tickets.len()
    })))
}

async fn create_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateTicketInput>,
) -> Result<Response, ServiceError> {
    let thread = state.services.tickets.create_ticket(&user, payload).await?;
    Ok(created_response(json!({
        "message": "Ticket created",
        "ticket": thread.ticket,
        "messages": thread.messages
    })))
}

async fn get_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> Result<Response, ServiceError> {
    let thread = state.services.tickets.get_ticket(&user, id).await?;
    Ok(success_response(json!({
        "ticket": thread.ticket,
        "messages": thread.messages
    })))
}

async fn update_ticket(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateTicketInput>,
) -> Result<Response, ServiceError> {
    let ticket = state
        .services
        .tickets
        .update_ticket(&user, id, payload)
        .await?;
    Ok(success_response(json!({ "ticket": ticket })))
}

async fn add_ticket_message(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<AddTicketMessageInput>,
) -> Result<Response, ServiceError> {
    let message = state
        .services
        .tickets
        .add_message(&user, id, payload)
        .await?;
    Ok(created_response(json!({ "ticket_message": message })))
}

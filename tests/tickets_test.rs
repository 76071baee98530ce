mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use ferrejunior::{
    auth::Role,
    entities::{TicketPriority, TicketStatus},
    errors::ServiceError,
    services::tickets::{
        AddTicketMessageInput, CreateTicketInput, TicketListQuery, UpdateTicketInput,
    },
};
use serde_json::json;

fn ticket(subject: &str, priority: Option<&str>) -> CreateTicketInput {
    CreateTicketInput {
        subject: subject.to_string(),
        description: "El taladro llegó sin la broca de 10 mm".to_string(),
        category: Some("reclamo".to_string()),
        priority: priority.map(str::to_string),
    }
}

fn say(message: &str, is_internal: bool) -> AddTicketMessageInput {
    AddTicketMessageInput {
        message: message.to_string(),
        is_internal,
    }
}

#[tokio::test]
async fn opening_a_ticket_records_the_first_message() {
    let app = TestApp::new().await;
    let tickets = app.state.services.tickets.clone();
    let (client, _) = app.user(Role::Client);

    let thread = tickets
        .create_ticket(&client, ticket("Pedido incompleto", Some("alta")))
        .await
        .unwrap();
    assert_eq!(thread.ticket.status, TicketStatus::Open);
    assert_eq!(thread.ticket.priority, TicketPriority::High);
    assert_eq!(thread.ticket.user_id, client.user_id);
    assert_eq!(thread.ticket.category.as_deref(), Some("reclamo"));
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.messages[0].message, thread.ticket.message);

    let defaulted = tickets
        .create_ticket(&client, ticket("Factura", None))
        .await
        .unwrap();
    assert_eq!(defaulted.ticket.priority, TicketPriority::Medium);

    assert_matches!(
        tickets.create_ticket(&client, ticket("   ", None)).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        tickets.create_ticket(&client, ticket("Garantía", Some("someday"))).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn clients_only_see_their_own_tickets() {
    let app = TestApp::new().await;
    let tickets = app.state.services.tickets.clone();
    let (alice, _) = app.user(Role::Client);
    let (bob, _) = app.user(Role::Client);
    let (employee, _) = app.user(Role::Employee);

    let mine = tickets
        .create_ticket(&alice, ticket("Cambio de pintura", None))
        .await
        .unwrap();
    tickets
        .create_ticket(&bob, ticket("Devolución", None))
        .await
        .unwrap();

    let listed = tickets
        .list_tickets(&alice, TicketListQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.ticket.id);

    let all = tickets
        .list_tickets(&employee, TicketListQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    assert_matches!(
        tickets.get_ticket(&bob, mine.ticket.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        tickets
            .add_message(&bob, mine.ticket.id, say("hola", false))
            .await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn internal_notes_are_hidden_from_clients() {
    let app = TestApp::new().await;
    let tickets = app.state.services.tickets.clone();
    let (client, _) = app.user(Role::Client);
    let (employee, _) = app.user(Role::Employee);
    let opened = tickets
        .create_ticket(&client, ticket("Broca faltante", None))
        .await
        .unwrap();
    let id = opened.ticket.id;

    assert_matches!(
        tickets.add_message(&client, id, say("nota", true)).await,
        Err(ServiceError::Forbidden(_))
    );

    tickets
        .add_message(&employee, id, say("Proveedor confirma faltante", true))
        .await
        .unwrap();
    tickets
        .add_message(&employee, id, say("Le enviamos la broca mañana", false))
        .await
        .unwrap();

    let seen_by_client = tickets.get_ticket(&client, id).await.unwrap();
    assert_eq!(seen_by_client.messages.len(), 2);
    assert!(seen_by_client.messages.iter().all(|m| !m.is_internal));

    let seen_by_staff = tickets.get_ticket(&employee, id).await.unwrap();
    assert_eq!(seen_by_staff.messages.len(), 3);
    assert!(seen_by_staff.ticket.updated_at >= opened.ticket.updated_at);
}

#[tokio::test]
async fn staff_triage_tickets() {
    let app = TestApp::new().await;
    let tickets = app.state.services.tickets.clone();
    let (client, _) = app.user(Role::Client);
    let (employee, _) = app.user(Role::Employee);
    let id = tickets
        .create_ticket(&client, ticket("Cotización", None))
        .await
        .unwrap()
        .ticket
        .id;

    assert_matches!(
        tickets
            .update_ticket(
                &client,
                id,
                UpdateTicketInput {
                    status: Some("closed".into()),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let assigned = tickets
        .update_ticket(
            &employee,
            id,
            UpdateTicketInput {
                status: Some("en_proceso".into()),
                priority: Some("urgent".into()),
                assigned_to: Some(employee.user_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(assigned.status, TicketStatus::InProgress);
    assert_eq!(assigned.priority, TicketPriority::Urgent);
    assert_eq!(assigned.assigned_to, Some(employee.user_id));
    assert!(assigned.resolved_at.is_none());

    let queue = tickets
        .list_tickets(
            &employee,
            TicketListQuery {
                status: Some("in_progress".into()),
                assigned_to_me: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);

    let resolved = tickets
        .update_ticket(
            &employee,
            id,
            UpdateTicketInput {
                status: Some("resolved".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.assigned_to, Some(employee.user_id));

    let reopened = tickets
        .update_ticket(
            &employee,
            id,
            UpdateTicketInput {
                status: Some("open".into()),
                unassign: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(reopened.resolved_at.is_none());
    assert!(reopened.assigned_to.is_none());

    tickets
        .update_ticket(
            &employee,
            id,
            UpdateTicketInput {
                status: Some("closed".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_matches!(
        tickets.add_message(&client, id, say("¿Alguna novedad?", false)).await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_matches!(
        tickets
            .update_ticket(
                &employee,
                id,
                UpdateTicketInput {
                    status: Some("archived".into()),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn tickets_over_http() {
    let app = TestApp::new().await;
    let (_, client_token) = app.user(Role::Client);
    let (_, staff_token) = app.user(Role::Employee);

    let response = app
        .request(
            Method::POST,
            "/api/v1/tickets",
            Some(json!({
                "subject": "Tornillos equivocados",
                "description": "Pedí 1/4 y llegaron 3/8",
                "priority": "media"
            })),
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["ticket"]["status"], "open");
    assert_eq!(body["ticket"]["priority"], "medium");
    let id = body["ticket"]["id"].as_str().expect("ticket id").to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/tickets/{}/messages", id),
            Some(json!({ "message": "Revisar despacho", "is_internal": true })),
            Some(&staff_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/tickets/{}", id),
            Some(json!({ "status": "resolved" })),
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/tickets/{}", id),
            None,
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));

    let response = app
        .request(Method::GET, "/api/v1/tickets", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/tickets",
            Some(json!({ "subject": "Sin descripción" })),
            Some(&client_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

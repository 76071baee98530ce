//! Customer support tickets.
//!
//! Clients open tickets and talk to staff on them; staff triage them by
//! status, priority and assignee and can leave internal notes that clients
//! never see.

use crate::{
    auth::AuthUser,
    entities::{
        ticket, ticket_message, Ticket, TicketMessage, TicketMessageModel, TicketModel,
        TicketPriority, TicketStatus,
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// A ticket with the part of its conversation the caller may read, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct TicketThread {
    pub ticket: TicketModel,
    pub messages: Vec<TicketMessageModel>,
}

#[derive(Clone)]
pub struct TicketService {
    db: Arc<DatabaseConnection>,
}

impl TicketService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Opens a ticket; the description also becomes its first message.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id))]
    pub async fn create_ticket(
        &self,
        actor: &AuthUser,
        input: CreateTicketInput,
    ) -> Result<TicketThread, ServiceError> {
        input.validate()?;
        let subject = required(&input.subject, "subject")?;
        let description = required(&input.description, "description")?;
        let priority = match input.priority.as_deref() {
            Some(raw) => parse_priority(raw)?,
            None => TicketPriority::default(),
        };

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let ticket = ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(actor.user_id),
            subject: Set(subject),
            message: Set(description.clone()),
            status: Set(TicketStatus::Open),
            priority: Set(priority),
            category: Set(input.category.filter(|c| !c.trim().is_empty())),
            assigned_to: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            resolved_at: Set(None),
        }
        .insert(&txn)
        .await?;
        let first = insert_message(&txn, ticket.id, actor.user_id, description, false).await?;
        txn.commit().await?;

        info!(ticket_id = %ticket.id, %priority, "Support ticket opened");
        Ok(TicketThread {
            ticket,
            messages: vec![first],
        })
    }

    /// Newest first. Clients see their own tickets, staff see all of them.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn list_tickets(
        &self,
        actor: &AuthUser,
        query: TicketListQuery,
    ) -> Result<Vec<TicketModel>, ServiceError> {
        let mut select = Ticket::find();
        if !actor.is_staff() {
            select = select.filter(ticket::Column::UserId.eq(actor.user_id));
        } else if query.assigned_to_me {
            select = select.filter(ticket::Column::AssignedTo.eq(actor.user_id));
        }
        if let Some(status) = query.status.as_deref() {
            select = select.filter(ticket::Column::Status.eq(parse_status(status)?));
        }

        Ok(select
            .order_by_desc(ticket::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn get_ticket(
        &self,
        actor: &AuthUser,
        ticket_id: Uuid,
    ) -> Result<TicketThread, ServiceError> {
        let ticket = find_ticket(&*self.db, ticket_id).await?;
        actor.ensure_owner_or_staff(ticket.user_id)?;

        let mut messages =
            TicketMessage::find().filter(ticket_message::Column::TicketId.eq(ticket_id));
        if !actor.is_staff() {
            messages = messages.filter(ticket_message::Column::IsInternal.eq(false));
        }
        let messages = messages
            .order_by_asc(ticket_message::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(TicketThread { ticket, messages })
    }

    /// Appends to the conversation. Internal notes are staff only and closed
    /// tickets take no new messages.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id))]
    pub async fn add_message(
        &self,
        actor: &AuthUser,
        ticket_id: Uuid,
        input: AddTicketMessageInput,
    ) -> Result<TicketMessageModel, ServiceError> {
        let text = required(&input.message, "message")?;
        if input.is_internal && !actor.is_staff() {
            return Err(ServiceError::Forbidden(
                "only staff can add internal notes".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let ticket = find_ticket(&txn, ticket_id).await?;
        actor.ensure_owner_or_staff(ticket.user_id)?;
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::InvalidOperation(
                "ticket is closed".to_string(),
            ));
        }

        let message =
            insert_message(&txn, ticket_id, actor.user_id, text, input.is_internal).await?;
        let mut active: ticket::ActiveModel = ticket.into();
        active.updated_at = Set(message.created_at);
        active.update(&txn).await?;
        txn.commit().await?;

        info!(%ticket_id, is_internal = message.is_internal, "Ticket message added");
        Ok(message)
    }

    /// Staff triage: status, priority and assignee. Omitted fields keep their
    /// value; `unassign` clears the assignee.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id))]
    pub async fn update_ticket(
        &self,
        actor: &AuthUser,
        ticket_id: Uuid,
        input: UpdateTicketInput,
    ) -> Result<TicketModel, ServiceError> {
        actor.require_staff()?;
        let status = input.status.as_deref().map(parse_status).transpose()?;
        let priority = input.priority.as_deref().map(parse_priority).transpose()?;

        let txn = self.db.begin().await?;
        let ticket = find_ticket(&txn, ticket_id).await?;
        let old_status = ticket.status;
        let resolved_at = ticket.resolved_at;
        let now = Utc::now();

        let mut active: ticket::ActiveModel = ticket.into();
        if let Some(status) = status {
            active.status = Set(status);
            match (status.is_resolved(), resolved_at) {
                (true, None) => active.resolved_at = Set(Some(now)),
                (false, Some(_)) => active.resolved_at = Set(None),
                _ => {}
            }
        }
        if let Some(priority) = priority {
            active.priority = Set(priority);
        }
        if input.unassign {
            active.assigned_to = Set(None);
        } else if let Some(assignee) = input.assigned_to {
            active.assigned_to = Set(Some(assignee));
        }
        active.updated_at = Set(now);
        let ticket = active.update(&txn).await?;
        txn.commit().await?;

        info!(%ticket_id, %old_status, new_status = %ticket.status, "Ticket updated");
        Ok(ticket)
    }
}

async fn find_ticket<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
) -> Result<TicketModel, ServiceError> {
    Ticket::find_by_id(ticket_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Ticket", ticket_id))
}

async fn insert_message<C: ConnectionTrait>(
    conn: &C,
    ticket_id: Uuid,
    user_id: Uuid,
    message: String,
    is_internal: bool,
) -> Result<TicketMessageModel, ServiceError> {
    Ok(ticket_message::ActiveModel {
        id: Set(Uuid::new_v4()),
        ticket_id: Set(ticket_id),
        user_id: Set(user_id),
        message: Set(message),
        is_internal: Set(is_internal),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?)
}

fn required(value: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn parse_status(raw: &str) -> Result<TicketStatus, ServiceError> {
    TicketStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("invalid ticket status: {}", raw)))
}

fn parse_priority(raw: &str) -> Result<TicketPriority, ServiceError> {
    TicketPriority::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("invalid ticket priority: {}", raw)))
}

/// Body for opening a ticket
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTicketInput {
    #[validate(length(max = 200))]
    pub subject: String,
    pub description: String,
    #[validate(length(max = 50))]
    pub category: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddTicketMessageInput {
    pub message: String,
    #[serde(default)]
    pub is_internal: bool,
}

/// Staff changes to a ticket
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTicketInput {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub unassign: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub assigned_to_me: bool,
}

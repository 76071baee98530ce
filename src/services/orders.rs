use crate::{
    auth::AuthUser,
    entities::{
        delivery_tracking, order, order_item, order_status_history, DeliveryTracking,
        NotificationKind, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus,
        OrderStatusHistoryModel, TrackingState,
    },
    errors::ServiceError,
    lifecycle,
    services::{inventory, notifications::NotificationService, tracking::close_tracking},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use tracing::{info, instrument};
use uuid::Uuid;

/// An order together with its lines. `items` is always present, possibly empty.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

/// One audit row to append to an order's status history.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    pub status: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
}

impl HistoryEntry {
    pub fn new(status: impl ToString, note: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            note: Some(note.into()),
            ..Default::default()
        }
    }

    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

/// Appends an immutable history row; callers pass their open transaction.
pub async fn append_history<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    entry: HistoryEntry,
) -> Result<OrderStatusHistoryModel, ServiceError> {
    let row = order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(entry.status),
        latitude: Set(entry.latitude),
        longitude: Set(entry.longitude),
        address: Set(entry.address),
        note: Set(entry.note),
        actor_id: Set(entry.actor_id),
        created_at: Set(Utc::now()),
    };
    Ok(row.insert(conn).await?)
}

pub async fn find_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderModel, ServiceError> {
    Order::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

async fn with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> Result<OrderWithItems, ServiceError> {
    let items = order
        .find_related(OrderItem)
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(OrderWithItems { order, items })
}

/// Order reads, admin status changes and deletion.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    notifications: NotificationService,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, notifications: NotificationService) -> Self {
        Self { db, notifications }
    }

    /// Owners see their own orders; staff see any order.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn get_order(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        actor.ensure_owner_or_staff(order.user_id)?;
        with_items(&*self.db, order).await
    }

    /// Newest first. Clients only ever see their own orders.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn list_orders(
        &self,
        actor: &AuthUser,
        query: OrderListQuery,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        let mut select = Order::find();
        if !actor.is_staff() {
            select = select.filter(order::Column::UserId.eq(actor.user_id));
        }
        if let Some(status) = query.status.as_deref() {
            select = select.filter(order::Column::Status.eq(parse_status(status)?));
        }

        let orders = select
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(OrderItem)
            .all(&*self.db)
            .await?;

        Ok(orders
            .into_iter()
            .map(|(order, items)| OrderWithItems { order, items })
            .collect())
    }

    /// Admin override of the order status. Reaching a terminal status also
    /// closes any delivery tracking still open for the order.
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.user_id, new_status = %input.status))]
    pub async fn update_status(
        &self,
        actor: &AuthUser,
        order_id: Uuid,
        input: UpdateOrderStatusInput,
    ) -> Result<OrderWithItems, ServiceError> {
        actor.require_admin()?;
        let new_status = parse_status(&input.status)?;

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        let old_status = order.status;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        if let Some(notes) = input.notes.clone() {
            active.notes = Set(notes);
        }
        let order = active.update(&txn).await?;

        let closing = match new_status {
            OrderStatus::Delivered => Some(TrackingState::Delivered),
            OrderStatus::Cancelled => Some(TrackingState::Cancelled),
            _ => None,
        };
        if let Some(state) = closing {
            if close_tracking(&txn, order_id, state).await?.is_some() {
                info!(%order_id, tracking_state = %state, "Delivery tracking closed");
            }
        }

        let note = input
            .notes
            .unwrap_or_else(|| format!("Status changed from {} to {}", old_status, new_status));
        append_history(&txn, order_id, HistoryEntry::new(new_status, note).by(actor.user_id))
            .await?;

        let result = with_items(&txn, order).await?;
        txn.commit().await?;

        info!(%order_id, %old_status, %new_status, "Order status updated");

        let kind = match new_status {
            OrderStatus::Processing => Some(NotificationKind::InPreparation),
            OrderStatus::Delivered => Some(NotificationKind::Delivered),
            _ => None,
        };
        if let Some(kind) = kind {
            self.notifications
                .notify(
                    result.order.user_id,
                    order_id,
                    kind,
                    &result.order.order_number,
                    None,
                )
                .await;
        }

        Ok(result)
    }

    /// Hard delete, allowed only while the order is pending. Reserved stock
    /// of its lines goes back to the catalog. Status history and notifications
    /// are immutable and stay behind, with a final `deleted` history entry.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn delete_order(&self, actor: &AuthUser, order_id: Uuid) -> Result<(), ServiceError> {
        actor.require_admin()?;

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        lifecycle::ensure_order_deletable(order.status)?;

        let items = order.find_related(OrderItem).all(&txn).await?;
        for item in &items {
            inventory::release(&txn, item.product_id, item.quantity).await?;
        }

        OrderItem::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        DeliveryTracking::delete_many()
            .filter(delivery_tracking::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        Order::delete_by_id(order_id).exec(&txn).await?;
        append_history(
            &txn,
            order_id,
            HistoryEntry::new("deleted", format!("Order {} deleted", order.order_number))
                .by(actor.user_id),
        )
        .await?;

        txn.commit().await?;
        info!(%order_id, order_number = %order.order_number, "Order deleted");
        Ok(())
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("invalid order status: {}", raw)))
}

/// Query parameters for listing orders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
}

/// Body for an admin status change
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrderStatusInput {
    pub status: String,
    pub notes: Option<String>,
}

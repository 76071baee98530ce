use crate::{
    entities::{order_notification, NotificationKind, OrderNotification, OrderNotificationModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 100;

/// Title and message shown to the customer for a notification kind.
pub fn render(
    kind: NotificationKind,
    order_number: &str,
    eta_minutes: Option<i32>,
) -> (String, String) {
    let (title, message) = match kind {
        NotificationKind::OrderConfirmed => (
            "Pedido confirmado",
            format!("Tu pedido #{} ha sido confirmado", order_number),
        ),
        NotificationKind::InPreparation => (
            "Pedido en preparación",
            format!("Tu pedido #{} está siendo preparado", order_number),
        ),
        NotificationKind::OutForDelivery => (
            "Pedido en camino",
            format!("Tu pedido #{} está en camino", order_number),
        ),
        NotificationKind::NearDelivery => (
            "Tu pedido está cerca",
            format!(
                "¡Tu pedido #{} está cerca! Llegará en {} minutos",
                order_number,
                eta_minutes.unwrap_or(1)
            ),
        ),
        NotificationKind::Delivered => (
            "Pedido entregado",
            format!("Tu pedido #{} ha sido entregado", order_number),
        ),
        NotificationKind::LocationUpdate => (
            "Ubicación actualizada",
            format!("Ubicación actualizada para el pedido #{}", order_number),
        ),
    };
    (title.to_string(), message)
}

/// Persisted, user-addressed order notifications.
///
/// `notify` is fire-and-forget: callers invoke it after their own
/// transaction committed and a failure here is only logged.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn notify(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        kind: NotificationKind,
        order_number: &str,
        eta_minutes: Option<i32>,
    ) -> Option<OrderNotificationModel> {
        let (title, message) = render(kind, order_number, eta_minutes);
        let notification = order_notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_id: Set(order_id),
            kind: Set(kind),
            title: Set(title),
            message: Set(message),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        };

        match notification.insert(&*self.db).await {
            Ok(saved) => {
                info!(notification_id = %saved.id, %kind, "Notification created");
                Some(saved)
            }
            Err(e) => {
                error!(error = %e, %order_id, %kind, "Failed to persist notification");
                None
            }
        }
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        query: NotificationQuery,
    ) -> Result<Vec<OrderNotificationModel>, ServiceError> {
        let mut select =
            OrderNotification::find().filter(order_notification::Column::UserId.eq(user_id));
        if query.unread_only {
            select = select.filter(order_notification::Column::IsRead.eq(false));
        }

        Ok(select
            .order_by_desc(order_notification::Column::CreatedAt)
            .limit(query.effective_limit())
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(OrderNotification::find()
            .filter(order_notification::Column::UserId.eq(user_id))
            .filter(order_notification::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn mark_read(
        &self,
        user_id: Uuid,
        notification_id: Uuid,
    ) -> Result<OrderNotificationModel, ServiceError> {
        let notification = OrderNotification::find_by_id(notification_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification", notification_id))?;

        if notification.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "notification belongs to another user".to_string(),
            ));
        }
        if notification.is_read {
            return Ok(notification);
        }

        let mut active: order_notification::ActiveModel = notification.into();
        active.is_read = Set(true);
        Ok(active.update(&*self.db).await?)
    }

    /// Marks every unread notification of the user read, optionally only for
    /// one order. Returns the number of rows changed.
    #[instrument(skip(self))]
    pub async fn mark_all_read(
        &self,
        user_id: Uuid,
        order_id: Option<Uuid>,
    ) -> Result<u64, ServiceError> {
        let mut update = OrderNotification::update_many()
            .col_expr(order_notification::Column::IsRead, Expr::value(true))
            .filter(order_notification::Column::UserId.eq(user_id))
            .filter(order_notification::Column::IsRead.eq(false));
        if let Some(order_id) = order_id {
            update = update.filter(order_notification::Column::OrderId.eq(order_id));
        }

        let result = update.exec(&*self.db).await?;
        info!(%user_id, updated = result.rows_affected, "Notifications marked read");
        Ok(result.rows_affected)
    }
}

/// Query parameters for listing notifications
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u64>,
}

impl NotificationQuery {
    pub fn effective_limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Body for bulk mark-read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkAllReadInput {
    pub order_id: Option<Uuid>,
}
